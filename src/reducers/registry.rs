use rustc_hash::FxHashMap;
use std::sync::Arc;

use crate::{
    reducers::{AddCategories, AddErrors, AddHistory, MergeScalars, Reducer, ReducerError},
    state::{GenerationState, StatePatch},
    types::ChannelType,
};
use tracing::instrument;

/// Maps channels to the reducers that merge patch data into them.
#[derive(Clone)]
pub struct ReducerRegistry {
    reducer_map: FxHashMap<ChannelType, Vec<Arc<dyn Reducer>>>,
}

/// Guard that checks whether a patch actually has meaningful data for the
/// specified channel, so the registry can skip reducers with nothing to do.
fn channel_guard(channel: ChannelType, patch: &StatePatch) -> bool {
    match channel {
        ChannelType::Scalar => {
            patch.phase.is_some()
                || patch.architect_iterations.is_some()
                || patch.skeleton.is_some()
                || patch.skeleton_approved.is_some()
                || patch.pending.is_some()
                || patch.resume.is_some()
                || patch.current_element.is_some()
                || patch.started_at.is_some()
        }
        ChannelType::History => !patch.history.is_empty(),
        ChannelType::Categories => !patch.categories.is_empty(),
        ChannelType::Errors => !patch.errors.is_empty(),
    }
}

impl Default for ReducerRegistry {
    fn default() -> Self {
        let mut registry = Self::new();
        registry
            .register(ChannelType::Scalar, Arc::new(MergeScalars))
            .register(ChannelType::History, Arc::new(AddHistory))
            .register(ChannelType::Categories, Arc::new(AddCategories))
            .register(ChannelType::Errors, Arc::new(AddErrors));
        registry
    }
}

impl ReducerRegistry {
    pub fn new() -> Self {
        Self {
            reducer_map: FxHashMap::default(),
        }
    }

    /// Register a reducer for a channel. Multiple reducers on the same
    /// channel are applied in registration order.
    pub fn register(&mut self, channel: ChannelType, reducer: Arc<dyn Reducer>) -> &mut Self {
        self.reducer_map.entry(channel).or_default().push(reducer);
        self
    }

    #[instrument(skip(self, state, patch), err)]
    pub fn try_update(
        &self,
        channel: ChannelType,
        state: &mut GenerationState,
        patch: &StatePatch,
    ) -> Result<(), ReducerError> {
        if !channel_guard(channel, patch) {
            return Ok(());
        }

        if let Some(reducers) = self.reducer_map.get(&channel) {
            for reducer in reducers {
                reducer.apply(state, patch);
            }
            Ok(())
        } else {
            Err(ReducerError::UnknownChannel(channel))
        }
    }

    /// Apply one patch across every registered channel.
    #[instrument(skip(self, state, patch), err)]
    pub fn apply_patch(
        &self,
        state: &mut GenerationState,
        patch: &StatePatch,
    ) -> Result<(), ReducerError> {
        for channel in [
            ChannelType::Scalar,
            ChannelType::History,
            ChannelType::Categories,
            ChannelType::Errors,
        ] {
            self.try_update(channel, state, patch)?;
        }
        Ok(())
    }
}
