use crate::{
    config::{keys, ConfigTree, ValuePayload},
    error::Result,
    msp::MspIdentitySet,
};
use std::collections::BTreeMap;
use tracing::warn;

/// Every MSP defined anywhere in a config tree, by MSP ID. This is how a
/// principal like `Org1MSP.admin` finds out what `Org1MSP` means.
#[derive(Debug, Clone, Default)]
pub struct MspRegistry {
    msps: BTreeMap<String, MspIdentitySet>,
}

impl MspRegistry {
    /// Collect the MSPs in `tree`. MSP values that don't decode are skipped:
    /// principals naming them won't resolve.
    pub fn from_tree(tree: &ConfigTree) -> Result<Self> {
        let mut msps = BTreeMap::new();
        for id in tree.descendants(tree.root())? {
            let group = tree.group(id)?;
            let value = match group.values().get(keys::MSP_KEY) {
                Some(x) => x,
                None => continue,
            };
            match value.payload() {
                Ok(ValuePayload::Msp(msp)) => {
                    msps.insert(msp.name().clone(), msp.clone());
                }
                Ok(_) => {}
                Err(e) => warn!(group = %group.name(), error = %e, "skipping undecodable MSP"),
            }
        }
        Ok(Self { msps })
    }

    pub fn get(&self, msp_id: &str) -> Option<&MspIdentitySet> {
        self.msps.get(msp_id)
    }

    /// The MSP IDs we know about.
    pub fn names(&self) -> impl Iterator<Item = &String> {
        self.msps.keys()
    }
}
