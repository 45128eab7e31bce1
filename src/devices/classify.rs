// Headphone classification by label heuristic.

/// Case-insensitive substring keywords that mark an output device as
/// headphone-like. Generic terms plus the brand/model tokens we have seen in
/// the wild. Intentionally conservative: an unrecognized label never flips
/// presence on its own.
const HEADPHONE_KEYWORDS: &[&str] = &[
    "headphone",
    "headset",
    "earphone",
    "earbud",
    "airpod",
    "bose",
    "sony wh",
    "sony wf",
    "beats",
    "jabra",
    "sennheiser",
    "bluetooth",
    "wireless",
    "buds",
    "qc35",
    "qc45",
    "wh-1000",
    "wf-1000",
];

/// True when the label matches any classification keyword. Empty labels are
/// never headphone-like: classification requires text, even though such
/// devices still count for churn bookkeeping.
pub fn is_headphone_label(label: &str) -> bool {
    if label.is_empty() {
        return false;
    }
    let lower = label.to_lowercase();
    HEADPHONE_KEYWORDS.iter().any(|kw| lower.contains(kw))
}
