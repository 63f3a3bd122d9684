//! Pluggable generators.
//!
//! A policy binds a generator name to a registry key; each invocation gets a
//! fresh instance, so implementations may keep per-call state.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use chrono::NaiveDate;

use super::ValueKind;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct CustomError(pub String);

impl CustomError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

pub trait CustomGenerator {
    fn set_argument(&mut self, name: &str, value: &str) -> Result<(), CustomError>;
    fn value(&self) -> Result<String, CustomError>;
    fn value_kind(&self) -> Result<ValueKind, CustomError>;
}

pub type CustomFactory = Arc<dyn Fn() -> Box<dyn CustomGenerator> + Send + Sync>;

#[derive(Clone, Default)]
pub struct CustomRegistry {
    factories: BTreeMap<String, CustomFactory>,
}

impl fmt::Debug for CustomRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CustomRegistry")
            .field("implementations", &self.factories.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl CustomRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the bundled implementations (`YearBound`).
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(YearBound::NAME, YearBound::default);
        registry
    }

    pub fn register<F, G>(&mut self, implementation: impl Into<String>, factory: F)
    where
        F: Fn() -> G + Send + Sync + 'static,
        G: CustomGenerator + 'static,
    {
        self.factories.insert(
            implementation.into(),
            Arc::new(move || Box::new(factory()) as Box<dyn CustomGenerator>),
        );
    }

    pub fn get(&self, implementation: &str) -> Option<&CustomFactory> {
        self.factories.get(implementation)
    }

    pub fn implementations(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }
}

// ============================================================================
// YearBound
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Bound {
    Lower,
    Upper,
}

/// Turns a year into the first or last second of that year.
///
/// Arguments: `text` (the year, optionally signed) and `bound`
/// (`Lower` or `Upper`, case-insensitive).
#[derive(Debug, Default)]
pub struct YearBound {
    year: Option<String>,
    bound: Option<Bound>,
}

impl YearBound {
    pub const NAME: &'static str = "YearBound";
}

impl CustomGenerator for YearBound {
    fn set_argument(&mut self, name: &str, value: &str) -> Result<(), CustomError> {
        match name {
            "text" => {
                self.year = Some(value.trim().to_string());
                Ok(())
            }
            "bound" => {
                self.bound = Some(match value.trim().to_ascii_lowercase().as_str() {
                    "lower" => Bound::Lower,
                    "upper" => Bound::Upper,
                    other => return Err(CustomError::new(format!("unknown bound `{other}`"))),
                });
                Ok(())
            }
            other => Err(CustomError::new(format!("unexpected argument `{other}`"))),
        }
    }

    fn value(&self) -> Result<String, CustomError> {
        let raw = self
            .year
            .as_deref()
            .ok_or_else(|| CustomError::new("year not set"))?;
        let bound = self.bound.ok_or_else(|| CustomError::new("bound not set"))?;
        let year: i32 = raw
            .parse()
            .map_err(|_| CustomError::new(format!("`{raw}` is not a year")))?;
        let stamp = match bound {
            Bound::Lower => NaiveDate::from_ymd_opt(year, 1, 1).and_then(|d| d.and_hms_opt(0, 0, 0)),
            Bound::Upper => {
                NaiveDate::from_ymd_opt(year, 12, 31).and_then(|d| d.and_hms_opt(23, 59, 59))
            }
        }
        .ok_or_else(|| CustomError::new(format!("year {year} is out of range")))?;
        Ok(stamp.format("%Y-%m-%dT%H:%M:%S").to_string())
    }

    fn value_kind(&self) -> Result<ValueKind, CustomError> {
        Ok(ValueKind::Literal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn year_bound(year: &str, bound: &str) -> Result<String, CustomError> {
        let mut g = YearBound::default();
        g.set_argument("text", year)?;
        g.set_argument("bound", bound)?;
        g.value()
    }

    #[test]
    fn year_bound_produces_first_and_last_second() {
        assert_eq!(year_bound("1434", "Lower").unwrap(), "1434-01-01T00:00:00");
        assert_eq!(year_bound(" 1434 ", "upper").unwrap(), "1434-12-31T23:59:59");
    }

    #[test]
    fn year_bound_rejects_garbage() {
        assert!(year_bound("circa 1400", "Lower").is_err());
        assert!(year_bound("1400", "middle").is_err());
        assert!(YearBound::default().value().is_err());
    }

    #[test]
    fn registry_hands_out_fresh_instances() {
        let registry = CustomRegistry::with_defaults();
        let factory = registry.get(YearBound::NAME).unwrap();
        let mut a = factory();
        a.set_argument("text", "2000").unwrap();
        let b = factory();
        assert!(b.value().is_err());
        assert_eq!(registry.implementations().collect::<Vec<_>>(), vec!["YearBound"]);
    }
}
