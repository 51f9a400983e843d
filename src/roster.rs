//! Recipient and sender tables.
//!
//! Both tables are CSV files with a header row. They are loaded once at
//! startup and never modified afterwards.

use std::collections::BTreeSet;
use std::io;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recipient {
    pub name: String,
    #[serde(default, deserialize_with = "empty_as_none")]
    pub dept: Option<String>,
    #[serde(default, deserialize_with = "empty_as_none")]
    pub email: Option<String>,
    #[serde(default, deserialize_with = "empty_as_none")]
    pub number: Option<String>,
}

impl Recipient {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            dept: None,
            email: None,
            number: None,
        }
    }

    pub fn with_dept(mut self, dept: impl Into<String>) -> Self {
        self.dept = Some(dept.into());
        self
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    pub fn with_number(mut self, number: impl Into<String>) -> Self {
        self.number = Some(number.into());
        self
    }
}

#[derive(Clone, PartialEq, Deserialize)]
pub struct SenderCredential {
    pub email: String,
    pub app_password: String,
}

impl SenderCredential {
    pub fn new(email: impl Into<String>, app_password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            app_password: app_password.into(),
        }
    }
}

impl std::fmt::Debug for SenderCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SenderCredential")
            .field("email", &self.email)
            .field("app_password", &"[REDACTED]")
            .finish()
    }
}

#[derive(Debug)]
pub enum RosterError {
    Read { path: PathBuf, message: String },
    Parse { path: PathBuf, message: String },
    NoSenders { path: PathBuf },
}

impl std::fmt::Display for RosterError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RosterError::Read { path, message } => {
                write!(f, "Failed to read {}: {message}", path.display())
            }
            RosterError::Parse { path, message } => {
                write!(f, "Failed to parse {}: {message}", path.display())
            }
            RosterError::NoSenders { path } => {
                write!(f, "Sender table {} has no rows", path.display())
            }
        }
    }
}

impl std::error::Error for RosterError {}

/// The two input tables of a dispatcher instance.
#[derive(Debug, Clone, Default)]
pub struct Roster {
    pub recipients: Vec<Recipient>,
    pub senders: Vec<SenderCredential>,
}

impl Roster {
    pub fn load(receivers_path: &Path, senders_path: &Path) -> Result<Self, RosterError> {
        let recipients = read_table(receivers_path)?;
        let senders: Vec<SenderCredential> = read_table(senders_path)?;

        if senders.is_empty() {
            return Err(RosterError::NoSenders {
                path: senders_path.to_path_buf(),
            });
        }

        tracing::info!(
            "Loaded {} recipients and {} senders",
            recipients.len(),
            senders.len()
        );

        Ok(Self {
            recipients,
            senders,
        })
    }

    /// Sorted, unique, non-empty department values.
    pub fn departments(&self) -> Vec<String> {
        self.recipients
            .iter()
            .filter_map(|r| r.dept.as_deref())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .map(str::to_string)
            .collect()
    }

    /// Recipients whose department is in `selected`, in table order.
    /// An empty selection keeps every row.
    pub fn filter_by_departments(&self, selected: &[String]) -> Vec<&Recipient> {
        self.recipients
            .iter()
            .filter(|r| {
                selected.is_empty()
                    || r
                        .dept
                        .as_ref()
                        .is_some_and(|dept| selected.iter().any(|s| s == dept))
            })
            .collect()
    }
}

pub fn parse_table<T: DeserializeOwned, R: io::Read>(reader: R) -> Result<Vec<T>, csv::Error> {
    csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader)
        .deserialize()
        .collect()
}

fn read_table<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>, RosterError> {
    let file = std::fs::File::open(path).map_err(|e| RosterError::Read {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;

    parse_table(file).map_err(|e| RosterError::Parse {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

fn empty_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value.filter(|s| !s.trim().is_empty()))
}
