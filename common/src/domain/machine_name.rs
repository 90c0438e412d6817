use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::{
    convert::TryFrom,
    fmt::{self, Display},
    str::FromStr,
};

static MACHINE_NAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"^[a-zA-Z0-9]([a-zA-Z0-9-]*[a-zA-Z0-9])?(\.[a-zA-Z0-9]([a-zA-Z0-9-]*[a-zA-Z0-9])?)*$"#)
        .unwrap()
});

/// Primary key of a benchmark machine. Doubles as its agent queue name, so it
/// has to be safe to embed in pipeline slugs and queue targeting rules.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(try_from = "String")]
pub struct MachineName(String);

impl MachineName {
    pub fn into_string(self) -> String {
        self.0
    }
}

#[derive(thiserror::Error, Debug, PartialEq, Eq, Clone)]
#[error("invalid machine name {value:?}: {reason}")]
pub struct MachineNameError {
    pub value: String,
    pub reason: MachineNameErrorReason,
}

#[derive(thiserror::Error, Debug, PartialEq, Eq, Clone, Copy)]
pub enum MachineNameErrorReason {
    #[error("invalid chars")]
    InvalidChars,
    #[error("must be between 1 and 253 chars")]
    BadLength,
}

impl TryFrom<String> for MachineName {
    type Error = MachineNameError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        if !(1..=253).contains(&value.len()) {
            return Err(MachineNameError {
                value,
                reason: MachineNameErrorReason::BadLength,
            });
        }
        if MACHINE_NAME.is_match(&value) {
            Ok(MachineName(value))
        } else {
            Err(MachineNameError {
                value,
                reason: MachineNameErrorReason::InvalidChars,
            })
        }
    }
}

impl TryFrom<&str> for MachineName {
    type Error = <MachineName as TryFrom<String>>::Error;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::try_from(value.to_owned())
    }
}

impl FromStr for MachineName {
    type Err = MachineNameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::try_from(s)
    }
}

impl AsRef<str> for MachineName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Display for MachineName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
