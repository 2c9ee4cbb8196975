//! Merge request definitions.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

use crate::AssetRef;

/// One segment of a merge, in final playback order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeInput {
    /// Display name, e.g. "scene 2"
    pub name: String,
    /// Materialized result of the segment, if any
    pub asset: Option<AssetRef>,
}

impl MergeInput {
    pub fn new(name: impl Into<String>, asset: Option<AssetRef>) -> Self {
        Self {
            name: name.into(),
            asset,
        }
    }
}

/// Why a merge request cannot start.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PreconditionError {
    #[error("No inputs selected for merge")]
    NoInputs,

    #[error("{name} has no generated result")]
    MissingResult { name: String },

    #[error("{name} has not been materialized yet")]
    NotMaterialized { name: String },
}

/// Ordered list of segments and the destination of the merged file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeRequest {
    pub inputs: Vec<MergeInput>,
    pub output_path: PathBuf,
}

impl MergeRequest {
    pub fn new(inputs: Vec<MergeInput>, output_path: impl Into<PathBuf>) -> Self {
        Self {
            inputs,
            output_path: output_path.into(),
        }
    }

    /// Check the merge invariant and return the assets in order.
    pub fn materialized_assets(&self) -> Result<Vec<&AssetRef>, PreconditionError> {
        if self.inputs.is_empty() {
            return Err(PreconditionError::NoInputs);
        }

        self.inputs
            .iter()
            .map(|input| match &input.asset {
                None => Err(PreconditionError::MissingResult {
                    name: input.name.clone(),
                }),
                Some(asset) if !asset.is_materialized() => Err(PreconditionError::NotMaterialized {
                    name: input.name.clone(),
                }),
                Some(asset) => Ok(asset),
            })
            .collect()
    }

    /// Local paths of every input, or `None` if any input is not a local file.
    pub fn local_paths(&self) -> Option<Vec<PathBuf>> {
        self.inputs
            .iter()
            .map(|input| {
                input
                    .asset
                    .as_ref()
                    .and_then(|a| a.local_path())
                    .map(|p| p.to_path_buf())
            })
            .collect()
    }
}
