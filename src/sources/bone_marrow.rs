use super::{TableAdapter, COMMON_SENTINELS, GENERIC_ALIASES};

/// Public bone marrow transplant dataset (`bone-marrow-dataset.csv`)
pub(super) fn adapter() -> TableAdapter {
    TableAdapter::new("Bone Marrow", "bone_marrow", GENERIC_ALIASES, COMMON_SENTINELS)
}
