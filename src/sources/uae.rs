use super::{Sentinels, TableAdapter, GENERIC_ALIASES};

const SENTINELS: Sentinels = Sentinels {
    tokens: &[
        "Unknown",
        "99",
        "99.",
        "N/A",
        "NA",
        "Not Available",
        "Not Specified",
        "nan",
    ],
    numbers: &[99.0],
};

/// Sheet of the registry workbook holding the patient table (spelled as shipped)
pub(super) const SHEET: &str = "Origional Data";

/// UAE registry table, read from the workbook sheet or a CSV export of it
pub(super) fn adapter() -> TableAdapter {
    TableAdapter::new("UAE", "uae", GENERIC_ALIASES, SENTINELS)
}
