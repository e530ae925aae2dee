use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Load balancer data plane programmed by this controller.
#[derive(Debug, Default, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    #[default]
    MetalLb,
    Cilium,
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MetalLb => write!(f, "metallb"),
            Self::Cilium => write!(f, "cilium"),
        }
    }
}

#[derive(Debug, Clone, Copy, Error)]
pub struct ParseBackendKindError;

impl std::fmt::Display for ParseBackendKindError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        "provided string was not `metallb` or `cilium`".fmt(f)
    }
}

impl FromStr for BackendKind {
    type Err = ParseBackendKindError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "metallb" => Ok(BackendKind::MetalLb),
            "cilium" => Ok(BackendKind::Cilium),
            _ => Err(ParseBackendKindError),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest(
        input,
        expected,
        case("metallb", Some(BackendKind::MetalLb)),
        case("cilium", Some(BackendKind::Cilium)),
        case("calico", None)
    )]
    fn works_backend_kind_from_str(input: &str, expected: Option<BackendKind>) {
        assert_eq!(BackendKind::from_str(input).ok(), expected);
    }
}
