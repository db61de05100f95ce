//! Converts raw OS clipboard snapshots into the canonical `ClipboardEvent`
//!
//! Pure transformation, no I/O. Item order and representation order are
//! preserved exactly since previews depend on representation order.

use crate::interface::{ClipboardEvent, ClipboardItem, DataItem, FormatTag};

/// One logical item as read from the OS: (format, bytes) in OS preference order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawItem {
    pub formats: Vec<(FormatTag, Vec<u8>)>,
}

/// Everything the OS offered for one clipboard change
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawSnapshot {
    pub items: Vec<RawItem>,
}

/// Build the canonical event for a snapshot.
///
/// Repeated tags within an item keep their first occurrence. Items without
/// representations are dropped, and a snapshot left with no items yields None
/// (an emptied clipboard is not a capture).
pub fn normalize(snapshot: RawSnapshot) -> Option<ClipboardEvent> {
    let items: Vec<ClipboardItem> = snapshot
        .items
        .into_iter()
        .filter_map(normalize_item)
        .collect();

    if items.is_empty() {
        return None;
    }
    Some(ClipboardEvent { items })
}

fn normalize_item(raw: RawItem) -> Option<ClipboardItem> {
    let mut representations: Vec<DataItem> = Vec::with_capacity(raw.formats.len());
    for (format, payload) in raw.formats {
        if representations.iter().any(|rep| rep.format == format) {
            continue;
        }
        representations.push(DataItem { format, payload });
    }

    if representations.is_empty() {
        None
    } else {
        Some(ClipboardItem { representations })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formats::{RTF, UTF8_PLAIN_TEXT};

    fn raw(formats: Vec<(&str, &[u8])>) -> RawItem {
        RawItem {
            formats: formats
                .into_iter()
                .map(|(tag, bytes)| (FormatTag::from(tag), bytes.to_vec()))
                .collect(),
        }
    }

    #[test]
    fn test_preserves_item_and_representation_order() {
        let snapshot = RawSnapshot {
            items: vec![
                raw(vec![(RTF, &b"{rtf}"[..]), (UTF8_PLAIN_TEXT, &b"one"[..])]),
                raw(vec![(UTF8_PLAIN_TEXT, &b"two"[..])]),
            ],
        };
        let event = normalize(snapshot).unwrap();
        assert_eq!(event.items.len(), 2);
        assert_eq!(event.items[0].representations[0].format.as_str(), RTF);
        assert_eq!(event.items[0].representations[1].format.as_str(), UTF8_PLAIN_TEXT);
        assert_eq!(event.items[1].representations[0].payload, b"two");
    }

    #[test]
    fn test_duplicate_tags_keep_first() {
        let snapshot = RawSnapshot {
            items: vec![raw(vec![(UTF8_PLAIN_TEXT, &b"first"[..]), (UTF8_PLAIN_TEXT, &b"second"[..])])],
        };
        let event = normalize(snapshot).unwrap();
        assert_eq!(event.items[0].representations.len(), 1);
        assert_eq!(event.items[0].representations[0].payload, b"first");
    }

    #[test]
    fn test_empty_items_are_dropped() {
        let snapshot = RawSnapshot {
            items: vec![raw(vec![]), raw(vec![("com.example.custom", &b"\x00\x01"[..])])],
        };
        let event = normalize(snapshot).unwrap();
        assert_eq!(event.items.len(), 1);
        assert_eq!(event.items[0].representations[0].format.as_str(), "com.example.custom");
    }

    #[test]
    fn test_empty_snapshot_yields_nothing() {
        assert_eq!(normalize(RawSnapshot::default()), None);
        assert_eq!(normalize(RawSnapshot { items: vec![raw(vec![])] }), None);
    }

    #[test]
    fn test_zero_length_payload_is_kept() {
        let event = normalize(RawSnapshot { items: vec![raw(vec![(UTF8_PLAIN_TEXT, &b""[..])])] }).unwrap();
        assert!(event.items[0].representations[0].payload.is_empty());
    }
}
