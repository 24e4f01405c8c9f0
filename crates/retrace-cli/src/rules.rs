//! Compression rules given on the command line

use retrace_compression::{CancelPair, CompressionError, CompressorRegistry, CreateRemove, LastConsecutive, LastOnly};

/// One `--last-only`, `--last-consecutive`, `--cancel-pair` or
/// `--create-remove` argument
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Rule {
    LastOnly { f_id: String, parameter: String },
    LastConsecutive { f_id: String, parameter: String },
    CancelPair { add: String, remove: String },
    CreateRemove { create: String, remove: String },
}

fn split(rule: &str, expected: &'static str) -> Result<(String, String), CompressionError> {
    match rule.split_once(':') {
        Some((a, b)) if !a.is_empty() && !b.is_empty() && !b.contains(':') => Ok((a.to_owned(), b.to_owned())),
        _ => Err(CompressionError::invalid_rule(rule, expected)),
    }
}

impl Rule {
    pub(crate) fn last_only(rule: &str) -> Result<Self, CompressionError> {
        let (f_id, parameter) = split(rule, "F_ID:PARAMETER")?;
        Ok(Self::LastOnly { f_id, parameter })
    }

    pub(crate) fn last_consecutive(rule: &str) -> Result<Self, CompressionError> {
        let (f_id, parameter) = split(rule, "F_ID:PARAMETER")?;
        Ok(Self::LastConsecutive { f_id, parameter })
    }

    pub(crate) fn cancel_pair(rule: &str) -> Result<Self, CompressionError> {
        let (add, remove) = split(rule, "ADD_ID:REMOVE_ID")?;
        Ok(Self::CancelPair { add, remove })
    }

    pub(crate) fn create_remove(rule: &str) -> Result<Self, CompressionError> {
        let (create, remove) = split(rule, "CREATE_ID:REMOVE_ID")?;
        Ok(Self::CreateRemove { create, remove })
    }

    /// Pattern selecting the action ids this rule works on
    fn pattern(&self) -> String {
        match self {
            Self::LastOnly { f_id, .. } | Self::LastConsecutive { f_id, .. } => regex::escape(f_id),
            Self::CancelPair { add, remove } | Self::CreateRemove { create: add, remove } => {
                format!("({}|{})", regex::escape(add), regex::escape(remove))
            }
        }
    }
}

/// Registry applying `rules` in order
pub(crate) fn build(rules: &[Rule]) -> Result<CompressorRegistry, CompressionError> {
    let mut registry = CompressorRegistry::new();
    for rule in rules {
        let pattern = rule.pattern();
        match rule {
            Rule::LastOnly { f_id, parameter } => {
                registry.register(&pattern, LastOnly::per_parameter(f_id.as_str(), parameter))?;
            }
            Rule::LastConsecutive { f_id, parameter } => {
                registry.register(&pattern, LastConsecutive::per_parameter(f_id.as_str(), parameter))?;
            }
            Rule::CancelPair { add, remove } => {
                registry.register(&pattern, CancelPair::new(add.as_str(), remove.as_str()))?;
            }
            Rule::CreateRemove { create, remove } => {
                registry.register(&pattern, CreateRemove::new(create.as_str(), remove.as_str()))?;
            }
        }
    }
    Ok(registry)
}
