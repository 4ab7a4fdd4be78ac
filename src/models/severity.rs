//! Severity lattice
//!
//! Outcome severities and the merge operation that folds them into a
//! suite verdict.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::RunMode;

/// Outcome classification, totally ordered from best to worst.
///
/// `Enable` and `Disable` are virtual bounds used only as rerun and html
/// thresholds: every real severity is at least `Enable` and none reaches
/// `Disable`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Enable,
    Success,
    Skip,
    Warning,
    Fail,
    Error,
    Disable,
}

impl Severity {
    /// Severities a script outcome may carry
    pub const OUTCOMES: [Severity; 5] = [
        Severity::Success,
        Severity::Skip,
        Severity::Warning,
        Severity::Fail,
        Severity::Error,
    ];

    /// Return the worse of two severities
    pub fn merge(self, other: Severity) -> Severity {
        if other > self {
            other
        } else {
            self
        }
    }

    /// Whether this severity meets a threshold such as `rerun` or `html`
    pub fn meets(self, threshold: Severity) -> bool {
        self >= threshold
    }

    pub fn name(&self) -> &'static str {
        match self {
            Severity::Enable => "enable",
            Severity::Success => "success",
            Severity::Skip => "skip",
            Severity::Warning => "warning",
            Severity::Fail => "fail",
            Severity::Error => "error",
            Severity::Disable => "disable",
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            Severity::Success => "✓",
            Severity::Skip => "○",
            Severity::Warning => "⚠",
            Severity::Fail => "✗",
            Severity::Error => "!",
            Severity::Enable | Severity::Disable => " ",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "enable" => Ok(Severity::Enable),
            "success" => Ok(Severity::Success),
            "skip" => Ok(Severity::Skip),
            "warning" => Ok(Severity::Warning),
            "fail" => Ok(Severity::Fail),
            "error" => Ok(Severity::Error),
            "disable" => Ok(Severity::Disable),
            other => Err(format!("unknown severity: {other}")),
        }
    }
}

/// Fold outcome severities into a verdict.
///
/// Outside `validate` mode an empty outcome list is raised to `warning`.
pub fn verdict<I>(severities: I, mode: RunMode) -> Severity
where
    I: IntoIterator<Item = Severity>,
{
    let mut seen = false;
    let folded = severities.into_iter().fold(Severity::Success, |acc, s| {
        seen = true;
        acc.merge(s)
    });

    if !seen && mode != RunMode::Validate {
        folded.merge(Severity::Warning)
    } else {
        folded
    }
}

/// Severity for a script given its own result and the warnings it raised
pub fn with_warnings(severity: Severity, warnings: usize) -> Severity {
    if warnings > 0 {
        severity.merge(Severity::Warning)
    } else {
        severity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [Severity; 7] = [
        Severity::Enable,
        Severity::Success,
        Severity::Skip,
        Severity::Warning,
        Severity::Fail,
        Severity::Error,
        Severity::Disable,
    ];

    #[test]
    fn test_order() {
        for pair in ALL.windows(2) {
            assert!(pair[0] < pair[1], "{} < {}", pair[0], pair[1]);
        }
    }

    #[test]
    fn test_merge_laws() {
        for a in Severity::OUTCOMES {
            assert_eq!(a.merge(a), a);
            assert_eq!(a.merge(Severity::Success), a);
            assert_eq!(Severity::Success.merge(a), a);
            assert_eq!(a.merge(Severity::Error), Severity::Error);
            for b in Severity::OUTCOMES {
                assert_eq!(a.merge(b), b.merge(a));
                for c in Severity::OUTCOMES {
                    assert_eq!(a.merge(b).merge(c), a.merge(b.merge(c)));
                }
            }
        }
    }

    #[test]
    fn test_merge_never_better() {
        for a in Severity::OUTCOMES {
            for b in Severity::OUTCOMES {
                let m = a.merge(b);
                assert!(m >= a && m >= b);
            }
        }
    }

    #[test]
    fn test_verdict_all_success() {
        let v = verdict(vec![Severity::Success; 3], RunMode::Execute);
        assert_eq!(v, Severity::Success);
    }

    #[test]
    fn test_verdict_empty() {
        assert_eq!(verdict(Vec::new(), RunMode::Execute), Severity::Warning);
        assert_eq!(verdict(Vec::new(), RunMode::List), Severity::Warning);
        assert_eq!(verdict(Vec::new(), RunMode::Validate), Severity::Success);
    }

    #[test]
    fn test_verdict_worst_wins() {
        let v = verdict(
            vec![Severity::Success, Severity::Fail, Severity::Skip],
            RunMode::Execute,
        );
        assert_eq!(v, Severity::Fail);
    }

    #[test]
    fn test_thresholds() {
        assert!(Severity::Success.meets(Severity::Enable));
        assert!(!Severity::Error.meets(Severity::Disable));
        assert!(Severity::Fail.meets(Severity::Fail));
        assert!(!Severity::Warning.meets(Severity::Fail));
    }

    #[test]
    fn test_from_str() {
        assert_eq!("FAIL".parse::<Severity>(), Ok(Severity::Fail));
        assert!("bogus".parse::<Severity>().is_err());
        assert_eq!(with_warnings(Severity::Success, 1), Severity::Warning);
        assert_eq!(with_warnings(Severity::Fail, 2), Severity::Fail);
    }
}
