use std::{collections::BTreeMap, fmt};

pub type Map = BTreeMap<String, String>;

/// An equality-based label selector, written as `key=value` requirements
/// separated by commas. A bare `key` requires only that the label exists.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Selector(Vec<Requirement>);

#[derive(Clone, Debug, PartialEq, Eq)]
enum Requirement {
    Equals(String, String),
    Exists(String),
}

#[derive(Debug, thiserror::Error)]
#[error("invalid label selector requirement {0:?}")]
pub struct InvalidSelector(String);

// === impl Selector ===

impl Selector {
    pub fn matches(&self, labels: &Map) -> bool {
        self.0.iter().all(|req| match req {
            Requirement::Equals(k, v) => labels.get(k) == Some(v),
            Requirement::Exists(k) => labels.contains_key(k),
        })
    }
}

impl std::str::FromStr for Selector {
    type Err = InvalidSelector;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.split(',')
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .map(|r| match r.split_once('=') {
                Some((k, v)) if !k.trim().is_empty() && !v.contains('=') => Ok(
                    Requirement::Equals(k.trim().to_string(), v.trim().to_string()),
                ),
                None if !r.contains(char::is_whitespace) => Ok(Requirement::Exists(r.to_string())),
                _ => Err(InvalidSelector(r.to_string())),
            })
            .collect::<Result<_, _>>()
            .map(Self)
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, req) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            match req {
                Requirement::Equals(k, v) => write!(f, "{k}={v}")?,
                Requirement::Exists(k) => f.write_str(k)?,
            }
        }
        Ok(())
    }
}
