//! Kebab-case labels for the `bitflags` types, as written in config files
//! and printed in reports.

use bitflags::Flags;

/// Label lookup shared by every flag and status set in the crate.
pub trait FlagLabels: Flags {
    /// Labels of the named flags that are set, in declaration order.
    fn labels(&self) -> Vec<String> {
        self.iter_names()
            .map(|(name, _)| name.to_ascii_lowercase().replace('_', "-"))
            .collect()
    }

    /// Single named flag by its label, e.g. `disable-time-checks`. Constant
    /// names such as `DISABLE_TIME_CHECKS` are not labels.
    fn from_label(label: &str) -> Option<Self> {
        if label.is_empty() || label.bytes().any(|b| b == b'_' || b.is_ascii_uppercase()) {
            return None;
        }
        Self::from_name(&label.to_ascii_uppercase().replace('-', "_"))
    }
}

impl<F: Flags> FlagLabels for F {}
