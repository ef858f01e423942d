// Dense index encoding for team ids, shared by the team and opponent columns.
use std::collections::BTreeSet;

use crate::error::{Error, Result};
use crate::teams::TeamId;

/// Fitted vocabulary. Index `i` is the `i`-th smallest id seen at fit time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelEncoder {
    classes: Vec<TeamId>,
}

impl LabelEncoder {
    pub fn fit<I>(values: I) -> Self
    where
        I: IntoIterator<Item = TeamId>,
    {
        let classes: BTreeSet<TeamId> = values.into_iter().collect();
        LabelEncoder {
            classes: classes.into_iter().collect(),
        }
    }

    pub fn transform(&self, value: TeamId) -> Result<usize> {
        self.classes
            .binary_search(&value)
            .map_err(|_| Error::UnseenCategory(value.0))
    }

    #[cfg(test)]
    pub fn classes(&self) -> &[TeamId] {
        &self.classes
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }
}
