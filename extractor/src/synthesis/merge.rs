//! Per-subfield merge of item details into a holdings field.

use config::shared::IndexingProfileConfig;

use crate::changes::items::ItemChangeInfo;
use crate::marc::DataField;

/// Sentinel that clears a date subfield consumers parse by fixed offset.
///
/// Eight blanks with separators when the display pattern carries `-`, six
/// plain blanks otherwise. The width must match the pattern's rendered width
/// or downstream offset parsing breaks.
pub fn cleared_date(pattern: &str) -> &'static str {
    if pattern.contains('-') { "  -  -  " } else { "      " }
}

/// Applies one item's reported details to its holdings field.
///
/// Only subfields the profile maps are touched; every other subfield keeps
/// its byte-exact value and position. Unreported text values leave the
/// subfield alone, but an unreported date clears any stale value to the
/// sentinel so an expired due date does not linger.
pub fn apply_item_change(
    field: &mut DataField,
    item: &ItemChangeInfo,
    profile: &IndexingProfileConfig,
) {
    field.upsert_subfield(profile.item_record_number_subfield, &item.item_id);

    if let Some(code) = profile.call_number_subfield
        && let Some(call_number) = nonempty(&item.call_number)
    {
        field.upsert_subfield(code, call_number);
    }
    if let Some(code) = profile.location_subfield
        && let Some(location) = item.location.as_deref()
    {
        field.upsert_subfield(code, location);
    }
    if let Some(code) = profile.shelving_location_subfield
        && let Some(shelving_location) = item.shelving_location.as_deref()
    {
        field.upsert_subfield(code, shelving_location);
    }
    if let Some(code) = profile.status_subfield
        && let Some(status) = item.status.as_deref()
    {
        field.upsert_subfield(code, status);
    }
    if let Some(code) = profile.media_type_subfield
        && let Some(media_type) = nonempty(&item.media_type)
    {
        field.upsert_subfield(code, media_type);
    }
    if let Some(code) = profile.ytd_checkouts_subfield
        && let Some(ytd) = nonempty(&item.ytd_checkouts)
    {
        field.upsert_subfield(code, ytd);
    }
    if let Some(code) = profile.total_checkouts_subfield
        && let Some(total) = nonempty(&item.total_checkouts)
    {
        field.upsert_subfield(code, total);
    }

    apply_date(field, profile.due_date_subfield, &item.due_date, &profile.due_date_format);
    apply_date(
        field,
        profile.date_created_subfield,
        &item.date_created,
        &profile.date_created_format,
    );
    apply_date(
        field,
        profile.last_checkin_subfield,
        &item.last_checkin_date,
        &profile.last_checkin_format,
    );
}

fn apply_date(field: &mut DataField, code: Option<char>, value: &Option<String>, pattern: &str) {
    let Some(code) = code else {
        return;
    };
    match value.as_deref() {
        Some(value) => field.upsert_subfield(code, value),
        // A stale date must not survive its removal on the ILS side.
        None => {
            if field.subfield(code).is_some() {
                field.upsert_subfield(code, cleared_date(pattern));
            }
        }
    }
}

fn nonempty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile() -> IndexingProfileConfig {
        serde_json::from_value(serde_json::json!({
            "name": "ils",
            "record_store_path": "/tmp/records",
            "bulk_export_path": "/tmp/export",
            "call_number_subfield": "c",
            "location_subfield": "d",
            "shelving_location_subfield": "e",
            "status_subfield": "g",
            "media_type_subfield": "k",
            "ytd_checkouts_subfield": "o",
            "total_checkouts_subfield": "h",
            "due_date_subfield": "m",
            "date_created_subfield": "p",
            "last_checkin_subfield": "q",
            "last_checkin_format": "%m%d%y",
        }))
        .unwrap()
    }

    fn item() -> ItemChangeInfo {
        ItemChangeInfo {
            item_id: "I1".to_string(),
            bib_id: "12345".to_string(),
            ..ItemChangeInfo::default()
        }
    }

    #[test]
    fn reported_status_overwrites_in_place() {
        let mut field = DataField::new("949", ' ', ' ');
        field.push_subfield('b', "I1");
        field.push_subfield('g', "CHECKEDOUT");
        field.push_subfield('z', "untouched");

        let item = ItemChangeInfo {
            status: Some("AVAILABLE".to_string()),
            ..item()
        };
        apply_item_change(&mut field, &item, &profile());

        assert_eq!(field.subfield_value('g'), Some("AVAILABLE"));
        assert_eq!(field.subfields[1].code, 'g');
        assert_eq!(field.subfield_value('z'), Some("untouched"));
    }

    #[test]
    fn unreported_text_fields_are_left_alone() {
        let mut field = DataField::new("949", ' ', ' ');
        field.push_subfield('b', "I1");
        field.push_subfield('c', "FIC ABC");
        field.push_subfield('g', "AVAILABLE");

        apply_item_change(&mut field, &item(), &profile());

        assert_eq!(field.subfield_value('c'), Some("FIC ABC"));
        assert_eq!(field.subfield_value('g'), Some("AVAILABLE"));
    }

    #[test]
    fn unreported_due_date_clears_to_dashed_sentinel() {
        let mut field = DataField::new("949", ' ', ' ');
        field.push_subfield('b', "I1");
        field.push_subfield('m', "05-02-24");

        apply_item_change(&mut field, &item(), &profile());

        assert_eq!(field.subfield_value('m'), Some("  -  -  "));
    }

    #[test]
    fn dashless_pattern_clears_to_blank_sentinel() {
        let mut field = DataField::new("949", ' ', ' ');
        field.push_subfield('b', "I1");
        field.push_subfield('q', "050224");

        apply_item_change(&mut field, &item(), &profile());

        assert_eq!(field.subfield_value('q'), Some("      "));
    }

    #[test]
    fn absent_date_subfield_is_not_created() {
        let mut field = DataField::new("949", ' ', ' ');
        field.push_subfield('b', "I1");

        apply_item_change(&mut field, &item(), &profile());

        assert_eq!(field.subfield('m'), None);
        assert_eq!(field.subfield('q'), None);
    }

    #[test]
    fn unmapped_subfields_are_never_written() {
        let bare: IndexingProfileConfig = serde_json::from_value(serde_json::json!({
            "name": "ils",
            "record_store_path": "/tmp/records",
            "bulk_export_path": "/tmp/export",
        }))
        .unwrap();

        let mut field = DataField::new("949", ' ', ' ');
        field.push_subfield('b', "I1");
        let item = ItemChangeInfo {
            status: Some("AVAILABLE".to_string()),
            ..item()
        };
        apply_item_change(&mut field, &item, &bare);

        assert_eq!(field.subfields.len(), 1);
    }
}
