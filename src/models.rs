use crate::error::{CookerError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Cooking program identifiers shared across all model families
///
/// Each model family exposes a subset of these, in its own on-wire order.
/// The numeric program id sent to the device is the index into the family's
/// program list, not a property of the program itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Program {
    /// Manual program with user-chosen temperature and time
    MultiChef,
    /// Rice and cereals
    RiceCereals,
    /// Slow simmering
    Languor,
    /// Pilaf
    Pilaf,
    /// Frying
    Frying,
    /// Stewing
    Stewing,
    /// Pasta
    Pasta,
    /// Milk porridge
    MilkPorridge,
    /// Soup
    Soup,
    /// Yogurt
    Yogurt,
    /// Baking
    Baking,
    /// Steam cooking
    Steam,
    /// Legumes
    CookingLegumes,
    /// Wildfowl
    Wildfowl,
    /// Pizza
    Pizza,
    /// Bread
    Bread,
    /// Baby food
    BabyFood,
    /// Sous-vide
    SousVide,
    /// Deep frying
    DeepFrying,
    /// Desserts
    Desserts,
    /// Express cooking
    Express,
    /// Galantine
    Galantine,
    /// Yogurt dough
    YogurtDough,
    /// Cheesecake
    Cheesecake,
    /// Sauces
    Sous,
    /// Generic cooking
    Cooking,
    /// Warming up
    WarmingUp,
    /// Keep-warm
    Warming,
    /// Device idle sentinel - a valid observed state, never settable
    Standby,
    /// Reserved slot in the firmware program table
    Reserved,
}

impl Program {
    /// Every program known to any model family
    pub const ALL: [Self; 30] = [
        Self::MultiChef,
        Self::RiceCereals,
        Self::Languor,
        Self::Pilaf,
        Self::Frying,
        Self::Stewing,
        Self::Pasta,
        Self::MilkPorridge,
        Self::Soup,
        Self::Yogurt,
        Self::Baking,
        Self::Steam,
        Self::CookingLegumes,
        Self::Wildfowl,
        Self::Pizza,
        Self::Bread,
        Self::BabyFood,
        Self::SousVide,
        Self::DeepFrying,
        Self::Desserts,
        Self::Express,
        Self::Galantine,
        Self::YogurtDough,
        Self::Cheesecake,
        Self::Sous,
        Self::Cooking,
        Self::WarmingUp,
        Self::Warming,
        Self::Standby,
        Self::Reserved,
    ];

    /// Stable snake_case name, matching the vendor firmware nomenclature
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::MultiChef => "multi_chef",
            Self::RiceCereals => "rice_cereals",
            Self::Languor => "languor",
            Self::Pilaf => "pilaf",
            Self::Frying => "frying",
            Self::Stewing => "stewing",
            Self::Pasta => "pasta",
            Self::MilkPorridge => "milk_porridge",
            Self::Soup => "soup",
            Self::Yogurt => "yogurt",
            Self::Baking => "baking",
            Self::Steam => "steam",
            Self::CookingLegumes => "cooking_legumes",
            Self::Wildfowl => "wildfowl",
            Self::Pizza => "pizza",
            Self::Bread => "bread",
            Self::BabyFood => "baby_food",
            Self::SousVide => "sous_vide",
            Self::DeepFrying => "deep_frying",
            Self::Desserts => "desserts",
            Self::Express => "express",
            Self::Galantine => "galantine",
            Self::YogurtDough => "yogurt_dough",
            Self::Cheesecake => "cheesecake",
            Self::Sous => "sous",
            Self::Cooking => "cooking",
            Self::WarmingUp => "warming_up",
            Self::Warming => "warming",
            Self::Standby => "standby",
            Self::Reserved => "none",
        }
    }
}

impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Program {
    type Err = CookerError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .iter()
            .find(|p| p.as_str() == s)
            .copied()
            .ok_or_else(|| CookerError::UnsupportedProgram(s.to_string()))
    }
}

/// Factory defaults for one program slot of a model family
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgramDefaults {
    /// Default target temperature in Celsius
    pub temperature: u8,
    /// Default main timer hours
    pub hours: u8,
    /// Default main timer minutes
    pub minutes: u8,
    /// Program settings bit flags (submode, delayed start, post-heat, ...)
    pub flags: u8,
}

const fn d(temperature: u8, hours: u8, minutes: u8, flags: u8) -> ProgramDefaults {
    ProgramDefaults {
        temperature,
        hours,
        minutes,
        flags,
    }
}

/// Capability record for one model family
///
/// Behavior differences between cooker models are expressed entirely through
/// this data: the program list (whose order defines the wire ids), the
/// per-program defaults, and whether the family understands sub-programs.
#[derive(Debug)]
pub struct Model {
    family: u8,
    programs: &'static [Program],
    defaults: &'static [ProgramDefaults],
}

/// Known model names mapped to their family code
static MODELS: &[(&str, u8)] = &[
    ("RMC-M40S", 3),
    ("RMC-M42S", 3),
    ("RMC-M92S", 6),
    ("RMC-M92S-A", 6),
    ("RMC-M92S-C", 6),
    ("RMC-M92S-E", 6),
    ("RMC-M222S", 7),
    ("RMC-M222S-A", 7),
    ("RMC-M223S", 7),
    ("RMC-M223S-E", 7),
    ("RMC-M224S", 7),
    ("RFS-KMC001", 7),
    ("RMC-M225S", 7),
    ("RMC-M225S-E", 7),
    ("RMC-M226S", 7),
    ("RMC-M226S-E", 7),
    ("JK-MC501", 7),
    ("NK-MC10", 7),
    ("RMC-M227S", 7),
    ("RFS-KMC004", 7),
    ("RMC-M800S", 0),
    ("RMC-M903S", 5),
    ("RFS-KMC005", 5),
    ("RMC-961S", 4),
    ("RMC-CBD100S", 1),
    ("RMC-CBF390S", 2),
];

static PROGRAMS_0: [Program; 14] = [
    Program::Standby,
    Program::MultiChef,
    Program::RiceCereals,
    Program::Languor,
    Program::Pilaf,
    Program::Frying,
    Program::Stewing,
    Program::Pasta,
    Program::MilkPorridge,
    Program::Soup,
    Program::Yogurt,
    Program::Baking,
    Program::Steam,
    Program::CookingLegumes,
];

static DEFAULTS_0: [ProgramDefaults; 14] = [
    d(100, 0, 0, 0),
    d(100, 0, 30, 15),
    d(100, 0, 35, 7),
    d(97, 3, 0, 7),
    d(110, 1, 0, 7),
    d(180, 0, 15, 133),
    d(100, 1, 0, 135),
    d(100, 0, 8, 5),
    d(95, 0, 35, 7),
    d(99, 1, 0, 7),
    d(40, 8, 0, 6),
    d(145, 0, 45, 7),
    d(100, 0, 40, 135),
    d(100, 0, 40, 7),
];

static PROGRAMS_1: [Program; 22] = [
    Program::Standby,
    Program::MultiChef,
    Program::RiceCereals,
    Program::Soup,
    Program::Wildfowl,
    Program::Steam,
    Program::Cooking,
    Program::Stewing,
    Program::Languor,
    Program::Frying,
    Program::Baking,
    Program::Pizza,
    Program::Pilaf,
    Program::Yogurt,
    Program::Bread,
    Program::Pasta,
    Program::MilkPorridge,
    Program::BabyFood,
    Program::SousVide,
    Program::DeepFrying,
    Program::Desserts,
    Program::Express,
];

static DEFAULTS_1: [ProgramDefaults; 22] = [
    d(100, 0, 0, 0),
    d(100, 0, 30, 15),
    d(100, 0, 30, 7),
    d(100, 1, 0, 135),
    d(100, 1, 30, 7),
    d(100, 0, 35, 135),
    d(100, 0, 40, 135),
    d(100, 0, 50, 135),
    d(97, 3, 0, 7),
    d(170, 0, 18, 133),
    d(145, 1, 0, 7),
    d(150, 0, 30, 7),
    d(110, 0, 35, 7),
    d(38, 8, 0, 6),
    d(150, 3, 0, 7),
    d(100, 0, 8, 4),
    d(98, 0, 15, 7),
    d(40, 0, 10, 7),
    d(63, 2, 30, 6),
    d(160, 0, 18, 132),
    d(98, 0, 20, 7),
    d(100, 0, 20, 64),
];

static PROGRAMS_2: [Program; 23] = [
    Program::Standby,
    Program::Galantine,
    Program::Frying,
    Program::Pasta,
    Program::Baking,
    Program::Stewing,
    Program::YogurtDough,
    Program::MultiChef,
    Program::BabyFood,
    Program::Pilaf,
    Program::Soup,
    Program::Cheesecake,
    Program::MilkPorridge,
    Program::Bread,
    Program::Steam,
    Program::RiceCereals,
    Program::Desserts,
    Program::Languor,
    Program::Sous,
    Program::DeepFrying,
    Program::Cooking,
    Program::Express,
    Program::WarmingUp,
];

static DEFAULTS_2: [ProgramDefaults; 23] = [
    d(100, 0, 0, 0),
    d(100, 3, 0, 135),
    d(170, 0, 18, 133),
    d(100, 0, 8, 4),
    d(145, 1, 0, 7),
    d(100, 1, 0, 135),
    d(38, 8, 0, 6),
    d(100, 0, 30, 15),
    d(40, 0, 10, 7),
    d(110, 0, 35, 7),
    d(100, 0, 40, 135),
    d(140, 1, 0, 7),
    d(98, 0, 20, 7),
    d(150, 3, 0, 7),
    d(100, 0, 20, 135),
    d(100, 0, 15, 7),
    d(98, 0, 30, 7),
    d(97, 3, 0, 7),
    d(100, 0, 30, 4),
    d(160, 0, 16, 132),
    d(100, 0, 40, 135),
    d(100, 0, 30, 64),
    d(70, 0, 0, 64),
];

static PROGRAMS_3: [Program; 18] = [
    Program::MultiChef,
    Program::MilkPorridge,
    Program::Stewing,
    Program::Frying,
    Program::Soup,
    Program::Steam,
    Program::Pasta,
    Program::Languor,
    Program::Cooking,
    Program::Baking,
    Program::RiceCereals,
    Program::Pilaf,
    Program::Yogurt,
    Program::Pizza,
    Program::Bread,
    Program::Reserved,
    Program::Standby,
    Program::SousVide,
];

static DEFAULTS_3: [ProgramDefaults; 18] = [
    d(100, 0, 30, 15),
    d(101, 0, 30, 7),
    d(100, 1, 0, 7),
    d(165, 0, 18, 5),
    d(100, 1, 0, 7),
    d(100, 0, 35, 7),
    d(100, 0, 8, 4),
    d(98, 3, 0, 7),
    d(100, 0, 40, 7),
    d(140, 1, 0, 7),
    d(100, 0, 25, 7),
    d(110, 1, 0, 7),
    d(40, 8, 0, 6),
    d(145, 0, 20, 7),
    d(140, 3, 0, 7),
    d(0, 0, 0, 0),
    d(100, 0, 0, 0),
    d(62, 2, 30, 6),
];

static PROGRAMS_4: [Program; 12] = [
    Program::Standby,
    Program::RiceCereals,
    Program::Frying,
    Program::Steam,
    Program::Baking,
    Program::Stewing,
    Program::MultiChef,
    Program::Pilaf,
    Program::Soup,
    Program::MilkPorridge,
    Program::Yogurt,
    Program::Express,
];

static DEFAULTS_4: [ProgramDefaults; 12] = [
    d(100, 0, 0, 0),
    d(100, 0, 10, 7),
    d(150, 0, 15, 5),
    d(100, 0, 25, 7),
    d(140, 1, 0, 7),
    d(100, 1, 0, 7),
    d(100, 0, 30, 15),
    d(110, 1, 0, 7),
    d(100, 1, 0, 7),
    d(100, 0, 30, 7),
    d(38, 8, 0, 6),
    d(100, 0, 0, 64),
];

static PROGRAMS_5: [Program; 18] = [
    Program::Standby,
    Program::MultiChef,
    Program::MilkPorridge,
    Program::Stewing,
    Program::Frying,
    Program::Soup,
    Program::Steam,
    Program::Pasta,
    Program::Languor,
    Program::Cooking,
    Program::Baking,
    Program::RiceCereals,
    Program::Pilaf,
    Program::Yogurt,
    Program::Pizza,
    Program::Bread,
    Program::Desserts,
    Program::Express,
];

static DEFAULTS_5: [ProgramDefaults; 18] = [
    d(100, 0, 0, 0),
    d(100, 0, 30, 15),
    d(97, 0, 10, 7),
    d(100, 1, 0, 7),
    d(170, 0, 15, 5),
    d(99, 1, 0, 7),
    d(100, 0, 20, 7),
    d(100, 0, 8, 4),
    d(97, 5, 0, 7),
    d(100, 0, 40, 7),
    d(145, 1, 0, 7),
    d(100, 0, 35, 7),
    d(110, 1, 0, 7),
    d(38, 8, 0, 6),
    d(150, 0, 25, 7),
    d(150, 3, 0, 7),
    d(98, 0, 20, 7),
    d(100, 0, 20, 64),
];

static PROGRAMS_6: [Program; 19] = [
    Program::Standby,
    Program::MultiChef,
    Program::MilkPorridge,
    Program::Stewing,
    Program::Frying,
    Program::Soup,
    Program::Steam,
    Program::Pasta,
    Program::Languor,
    Program::Cooking,
    Program::Baking,
    Program::RiceCereals,
    Program::Pilaf,
    Program::Yogurt,
    Program::Pizza,
    Program::Bread,
    Program::Desserts,
    Program::Express,
    Program::Warming,
];

static DEFAULTS_6: [ProgramDefaults; 19] = [
    d(100, 0, 0, 0),
    d(100, 0, 30, 15),
    d(97, 0, 10, 7),
    d(100, 1, 0, 7),
    d(170, 0, 15, 5),
    d(99, 1, 0, 7),
    d(100, 0, 20, 7),
    d(100, 0, 8, 4),
    d(97, 5, 0, 7),
    d(100, 0, 40, 7),
    d(145, 1, 0, 7),
    d(100, 0, 35, 7),
    d(110, 1, 0, 7),
    d(38, 8, 0, 6),
    d(150, 0, 25, 7),
    d(150, 3, 0, 7),
    d(98, 0, 20, 7),
    d(100, 0, 0, 64),
    d(100, 70, 30, 64),
];

static PROGRAMS_7: [Program; 13] = [
    Program::Standby,
    Program::Frying,
    Program::RiceCereals,
    Program::MultiChef,
    Program::Pilaf,
    Program::Steam,
    Program::Baking,
    Program::Stewing,
    Program::Soup,
    Program::MilkPorridge,
    Program::Yogurt,
    Program::Express,
    Program::WarmingUp,
];

static DEFAULTS_7: [ProgramDefaults; 13] = [
    d(100, 0, 0, 0),
    d(150, 0, 15, 5),
    d(100, 0, 25, 7),
    d(100, 0, 30, 15),
    d(110, 1, 0, 7),
    d(100, 0, 25, 7),
    d(140, 1, 0, 7),
    d(100, 1, 0, 7),
    d(100, 1, 0, 7),
    d(100, 0, 30, 7),
    d(40, 8, 0, 6),
    d(100, 0, 20, 64),
    d(70, 0, 30, 64),
];

static FAMILIES: [Model; 8] = [
    Model {
        family: 0,
        programs: &PROGRAMS_0,
        defaults: &DEFAULTS_0,
    },
    Model {
        family: 1,
        programs: &PROGRAMS_1,
        defaults: &DEFAULTS_1,
    },
    Model {
        family: 2,
        programs: &PROGRAMS_2,
        defaults: &DEFAULTS_2,
    },
    Model {
        family: 3,
        programs: &PROGRAMS_3,
        defaults: &DEFAULTS_3,
    },
    Model {
        family: 4,
        programs: &PROGRAMS_4,
        defaults: &DEFAULTS_4,
    },
    Model {
        family: 5,
        programs: &PROGRAMS_5,
        defaults: &DEFAULTS_5,
    },
    Model {
        family: 6,
        programs: &PROGRAMS_6,
        defaults: &DEFAULTS_6,
    },
    Model {
        family: 7,
        programs: &PROGRAMS_7,
        defaults: &DEFAULTS_7,
    },
];

impl Model {
    /// Look up the capability record for a model name
    ///
    /// Regional variants carry an `-E` suffix not always present in the
    /// table; when the exact name is unknown the lookup retries without it.
    ///
    /// # Errors
    ///
    /// Returns [`CookerError::UnknownModel`] when the name matches no known
    /// model.
    pub fn resolve(name: &str) -> Result<&'static Self> {
        if let Some(family) = Self::family_code(name) {
            return Ok(&FAMILIES[family as usize]);
        }
        if let Some(base) = name.strip_suffix("-E") {
            if let Some(family) = Self::family_code(base) {
                return Ok(&FAMILIES[family as usize]);
            }
        }
        Err(CookerError::UnknownModel(name.to_string()))
    }

    fn family_code(name: &str) -> Option<u8> {
        MODELS
            .iter()
            .find(|(known, _)| *known == name)
            .map(|(_, family)| *family)
    }

    /// Family code of this model
    #[must_use]
    pub const fn family(&self) -> u8 {
        self.family
    }

    /// Whether this family understands the sub-program byte
    ///
    /// Family 3 (RMC-M40S/M42S) speaks the short one-byte program selection
    /// and the eight-byte parameter layout; every other family takes a
    /// sub-program id and a trailing flags byte.
    #[must_use]
    pub const fn supports_subprograms(&self) -> bool {
        self.family != 3
    }

    /// Number of program slots in this family's table
    #[must_use]
    pub const fn program_count(&self) -> usize {
        self.programs.len()
    }

    /// Program at the given wire id
    ///
    /// # Errors
    ///
    /// Returns [`CookerError::ProgramOutOfRange`] for ids past the table end.
    pub fn program(&self, program_id: u8) -> Result<Program> {
        self.programs
            .get(program_id as usize)
            .copied()
            .ok_or(CookerError::ProgramOutOfRange {
                program_id,
                family: self.family,
            })
    }

    /// Wire id of the given program, if this family has it
    #[must_use]
    pub fn program_id(&self, program: Program) -> Option<u8> {
        self.programs
            .iter()
            .position(|p| *p == program)
            .map(|idx| idx as u8)
    }

    /// Factory defaults for the given wire id
    ///
    /// # Errors
    ///
    /// Returns [`CookerError::ProgramOutOfRange`] for ids past the table end.
    pub fn defaults(&self, program_id: u8) -> Result<&ProgramDefaults> {
        self.defaults
            .get(program_id as usize)
            .ok_or(CookerError::ProgramOutOfRange {
                program_id,
                family: self.family,
            })
    }

    /// Wire id of the standby sentinel for this family
    ///
    /// Index 0 for most families; family 3 keeps it in slot 16.
    #[must_use]
    pub fn standby_id(&self) -> Option<u8> {
        self.program_id(Program::Standby)
    }

    /// Whether the given wire id is the standby sentinel
    #[must_use]
    pub fn is_standby(&self, program_id: u8) -> bool {
        self.program(program_id)
            .map(|p| p == Program::Standby)
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_known_models() {
        assert_eq!(Model::resolve("RMC-M40S").unwrap().family(), 3);
        assert_eq!(Model::resolve("RMC-M800S").unwrap().family(), 0);
        assert_eq!(Model::resolve("JK-MC501").unwrap().family(), 7);
    }

    #[test]
    fn test_resolve_regional_suffix() {
        // Not in the table directly, falls back to the base name
        assert_eq!(Model::resolve("RMC-M42S-E").unwrap().family(), 3);
        // Present in the table with the suffix, no fallback needed
        assert_eq!(Model::resolve("RMC-M92S-E").unwrap().family(), 6);
    }

    #[test]
    fn test_resolve_unknown_model() {
        assert!(matches!(
            Model::resolve("RMC-UNKNOWN"),
            Err(CookerError::UnknownModel(_))
        ));
    }

    #[test]
    fn test_program_out_of_range() {
        let model = Model::resolve("RMC-M800S").unwrap();
        assert!(model.program(13).is_ok());
        assert!(matches!(
            model.program(14),
            Err(CookerError::ProgramOutOfRange {
                program_id: 14,
                family: 0
            })
        ));
        assert!(model.defaults(200).is_err());
    }

    #[test]
    fn test_standby_position() {
        let m0 = Model::resolve("RMC-M800S").unwrap();
        assert_eq!(m0.standby_id(), Some(0));
        assert!(m0.is_standby(0));

        let m3 = Model::resolve("RMC-M40S").unwrap();
        assert_eq!(m3.standby_id(), Some(16));
        assert!(m3.is_standby(16));
        assert!(!m3.is_standby(0));
    }

    #[test]
    fn test_subprogram_support() {
        assert!(!Model::resolve("RMC-M40S").unwrap().supports_subprograms());
        assert!(Model::resolve("RMC-M222S").unwrap().supports_subprograms());
    }

    #[test]
    fn test_program_id_lookup() {
        let m0 = Model::resolve("RMC-M800S").unwrap();
        assert_eq!(m0.program_id(Program::Soup), Some(9));
        assert_eq!(m0.program_id(Program::Galantine), None);
        assert_eq!(m0.program(9).unwrap(), Program::Soup);
    }

    #[test]
    fn test_tables_are_consistent() {
        for family in 0..8u8 {
            let model = &super::FAMILIES[family as usize];
            assert_eq!(
                model.programs.len(),
                model.defaults.len(),
                "family {family} program/defaults length mismatch"
            );
        }
    }

    #[test]
    fn test_program_name_round_trip() {
        assert_eq!(Program::Soup.as_str(), "soup");
        assert_eq!(Program::MultiChef.to_string(), "multi_chef");
        assert_eq!(Program::Standby.as_str(), "standby");

        for program in Program::ALL {
            assert_eq!(program.as_str().parse::<Program>().unwrap(), program);
        }
        assert!("borscht".parse::<Program>().is_err());
    }
}
