//! Ordered model bootstrap: the first candidate that loads wins.

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum ModelLoadError {
    #[error("no model candidates were configured")]
    NoCandidates,
    #[error("every model candidate failed to load: {}", summarize(.failures))]
    Exhausted { failures: Vec<(PathBuf, String)> },
}

fn summarize(failures: &[(PathBuf, String)]) -> String {
    failures
        .iter()
        .map(|(path, err)| format!("{} ({err})", path.display()))
        .collect::<Vec<_>>()
        .join("; ")
}

/// A model together with the artifact it came from.
#[derive(Debug)]
pub struct LoadedModel<M> {
    pub model: M,
    pub path: PathBuf,
    /// True when a candidate other than the first one was used.
    pub fallback_used: bool,
}

/// Try `load` on each candidate path in order and return the first success.
///
/// Each failure is logged before moving on to the next candidate.
pub fn load_with_fallback<M, F>(
    candidates: &[PathBuf],
    mut load: F,
) -> Result<LoadedModel<M>, ModelLoadError>
where
    F: FnMut(&Path) -> anyhow::Result<M>,
{
    if candidates.is_empty() {
        return Err(ModelLoadError::NoCandidates);
    }

    let mut failures = Vec::new();
    for (idx, path) in candidates.iter().enumerate() {
        match load(path) {
            Ok(model) => {
                if idx > 0 {
                    info!("loaded fallback model {}", path.display());
                } else {
                    info!("loaded model {}", path.display());
                }
                return Ok(LoadedModel {
                    model,
                    path: path.clone(),
                    fallback_used: idx > 0,
                });
            }
            Err(err) => {
                warn!("failed to load model {}: {err:#}", path.display());
                failures.push((path.clone(), format!("{err:#}")));
            }
        }
    }

    Err(ModelLoadError::Exhausted { failures })
}

#[cfg(test)]
mod tests {
    use anyhow::anyhow;

    use super::*;

    fn candidates() -> Vec<PathBuf> {
        vec![PathBuf::from("best.pt"), PathBuf::from("yolo11n.pt")]
    }

    #[test]
    fn primary_model_is_preferred() {
        let loaded = load_with_fallback(&candidates(), |path| {
            Ok(path.display().to_string())
        })
        .unwrap();
        assert_eq!(loaded.model, "best.pt");
        assert!(!loaded.fallback_used);
    }

    #[test]
    fn falls_back_when_primary_fails() {
        let mut attempts = Vec::new();
        let loaded = load_with_fallback(&candidates(), |path| {
            attempts.push(path.to_path_buf());
            if path.ends_with("best.pt") {
                Err(anyhow!("missing weights"))
            } else {
                Ok(42)
            }
        })
        .unwrap();
        assert_eq!(loaded.model, 42);
        assert_eq!(loaded.path, PathBuf::from("yolo11n.pt"));
        assert!(loaded.fallback_used);
        assert_eq!(attempts.len(), 2);
    }

    #[test]
    fn reports_every_failure_when_all_candidates_fail() {
        let err = load_with_fallback::<(), _>(&candidates(), |_| Err(anyhow!("corrupt")))
            .unwrap_err();
        match &err {
            ModelLoadError::Exhausted { failures } => assert_eq!(failures.len(), 2),
            other => panic!("unexpected error: {other}"),
        }
        let message = err.to_string();
        assert!(message.contains("best.pt (corrupt)"));
        assert!(message.contains("yolo11n.pt (corrupt)"));
    }

    #[test]
    fn empty_candidate_list_is_an_error() {
        let err = load_with_fallback::<(), _>(&[], |_| Ok(())).unwrap_err();
        assert!(matches!(err, ModelLoadError::NoCandidates));
    }
}
