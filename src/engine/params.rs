//! Tunable search parameters of the engine, as exposed through its UCI options.
//!
//! Every entry carries its own perturbation size `c` (how far θ+ and θ- deviate
//! from the current value) and step size `r` (how far the value moves per
//! iteration at full gradient). Rough guideline:
//!   c ≈ (max - min) / 20
//!   r ≈ c / 4

use fxhash::FxHashSet;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterSpec {
    pub name: String,
    pub default: i64,
    pub min: i64,
    pub max: i64,
    pub c: i64,
    pub r: f64,
}

impl ParameterSpec {
    pub fn new(name: &str, default: i64, min: i64, max: i64, c: i64, r: f64) -> Self {
        Self {
            name: name.to_string(),
            default,
            min,
            max,
            c,
            r,
        }
    }

    pub fn clamp(&self, value: i64) -> i64 {
        value.clamp(self.min, self.max)
    }

    pub fn clamp_f64(&self, value: f64) -> f64 {
        value.clamp(self.min as f64, self.max as f64)
    }

    fn validate(&self) -> Result<(), ParamError> {
        if !(self.min <= self.default && self.default <= self.max) {
            return Err(ParamError::Invalid(format!(
                "{}: expected min <= default <= max, got {} <= {} <= {}",
                self.name, self.min, self.default, self.max
            )));
        }
        if self.c <= 0 || !(self.r > 0.0) {
            return Err(ParamError::Invalid(format!(
                "{}: c and r must be positive, got c={} r={}",
                self.name, self.c, self.r
            )));
        }
        Ok(())
    }
}

#[derive(Debug)]
pub enum ParamError {
    Invalid(String),
    Duplicate(String),
    Empty,
    Io(std::io::Error),
    Toml(toml::de::Error),
}

impl From<std::io::Error> for ParamError {
    fn from(error: std::io::Error) -> Self {
        ParamError::Io(error)
    }
}

impl From<toml::de::Error> for ParamError {
    fn from(error: toml::de::Error) -> Self {
        ParamError::Toml(error)
    }
}

impl fmt::Display for ParamError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamError::Invalid(message) => write!(f, "invalid parameter {}", message),
            ParamError::Duplicate(name) => write!(f, "parameter {} defined twice", name),
            ParamError::Empty => write!(f, "no parameters defined"),
            ParamError::Io(e) => write!(f, "{}", e),
            ParamError::Toml(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for ParamError {}

/// The ordered, validated set of tunable dimensions of one tuning run.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterTable {
    specs: Vec<ParameterSpec>,
}

#[derive(Deserialize)]
struct ParameterFile {
    parameter: Vec<ParameterSpec>,
}

impl ParameterTable {
    pub fn new(specs: Vec<ParameterSpec>) -> Result<Self, ParamError> {
        if specs.is_empty() {
            return Err(ParamError::Empty);
        }

        let mut seen = FxHashSet::default();
        for spec in &specs {
            spec.validate()?;
            if !seen.insert(spec.name.as_str()) {
                return Err(ParamError::Duplicate(spec.name.clone()));
            }
        }

        Ok(Self { specs })
    }

    /// Reads `[[parameter]]` entries with `name`, `default`, `min`, `max`, `c`, `r`.
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> Result<Self, ParamError> {
        let contents = fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, ParamError> {
        let file: ParameterFile = toml::from_str(contents)?;
        Self::new(file.parameter)
    }

    pub fn specs(&self) -> &[ParameterSpec] {
        &self.specs
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.specs.iter().position(|spec| spec.name == name)
    }

    pub fn get(&self, name: &str) -> Option<&ParameterSpec> {
        self.specs.iter().find(|spec| spec.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index_of(name).is_some()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.specs.iter().map(|spec| spec.name.as_str())
    }
}

impl Default for ParameterTable {
    fn default() -> Self {
        Self {
            specs: builtin_parameters(),
        }
    }
}

/// Concrete integer values for every parameter, as sent to one engine.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CandidateSet(BTreeMap<String, i64>);

impl CandidateSet {
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    pub fn defaults(table: &ParameterTable) -> Self {
        table
            .specs()
            .iter()
            .map(|spec| (spec.name.clone(), spec.default))
            .collect()
    }

    pub fn insert(&mut self, name: &str, value: i64) {
        self.0.insert(name.to_string(), value);
    }

    pub fn get(&self, name: &str) -> Option<i64> {
        self.0.get(name).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, i64)> {
        self.0.iter().map(|(name, value)| (name.as_str(), *value))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(String, i64)> for CandidateSet {
    fn from_iter<I: IntoIterator<Item = (String, i64)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

fn builtin_parameters() -> Vec<ParameterSpec> {
    vec![
        // Late move reductions
        ParameterSpec::new("LMR_FullDepthMoves", 3, 1, 10, 1, 0.5),
        ParameterSpec::new("LMR_ReductionLimit", 2, 1, 6, 1, 0.5),
        // Null move pruning
        ParameterSpec::new("NullMove_Reduction", 3, 1, 5, 1, 0.5),
        ParameterSpec::new("NullMove_MinDepth", 3, 1, 6, 1, 0.5),
        // Futility pruning margins (centipawns)
        ParameterSpec::new("Futility_Margin", 150, 50, 400, 20, 8.0),
        ParameterSpec::new("Futility_MarginD2", 300, 100, 600, 30, 10.0),
        ParameterSpec::new("Futility_MarginD3", 450, 150, 800, 40, 12.0),
        // Reverse futility pruning
        ParameterSpec::new("RFP_Margin", 80, 50, 300, 15, 5.0),
        ParameterSpec::new("RFP_MaxDepth", 8, 2, 10, 1, 0.5),
        // Aspiration windows
        ParameterSpec::new("Aspiration_Window", 100, 10, 200, 10, 4.0),
        // Razoring
        ParameterSpec::new("Razor_Margin", 300, 100, 600, 25, 8.0),
    ]
}
