//! Application target addressing (`module.path:attr`)

use super::LaunchError;
use regex::Regex;
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

/// Location of an application object: a dotted module path and an attribute
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AppTarget {
    module: String,
    attribute: String,
}

fn dotted_identifiers() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*(\.[A-Za-z_][A-Za-z0-9_]*)*$").expect("valid regex")
    })
}

impl AppTarget {
    pub fn parse(target: &str) -> Result<Self, LaunchError> {
        let invalid = |reason: &str| LaunchError::InvalidTarget {
            target: target.to_string(),
            reason: reason.to_string(),
        };

        let (module, attribute) = target
            .trim()
            .split_once(':')
            .ok_or_else(|| invalid("expected <module>:<attribute>"))?;

        if attribute.contains(':') {
            return Err(invalid("more than one ':'"));
        }
        if !dotted_identifiers().is_match(module) {
            return Err(invalid("module must be a dotted path of identifiers"));
        }
        if !dotted_identifiers().is_match(attribute) {
            return Err(invalid("attribute must be an identifier"));
        }

        Ok(Self {
            module: module.to_string(),
            attribute: attribute.to_string(),
        })
    }

    pub fn module(&self) -> &str {
        &self.module
    }

    pub fn attribute(&self) -> &str {
        &self.attribute
    }
}

impl FromStr for AppTarget {
    type Err = LaunchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for AppTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.module, self.attribute)
    }
}
