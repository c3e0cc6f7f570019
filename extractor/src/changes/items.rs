//! Item detail fetching and decoding.

use std::fmt::Write as _;

use chrono::{DateTime, FixedOffset};
use config::shared::IndexingProfileConfig;
use tracing::{debug, error, warn};

use crate::protocol::batch;
use crate::protocol::client::SoapTransport;
use crate::protocol::envelope;
use crate::protocol::xml::Element;

/// Current details for one changed item, as reported by the ILS.
///
/// A `None` field means the ILS did not report it; the merge leaves the
/// corresponding holdings subfield untouched in that case.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ItemChangeInfo {
    pub item_id: String,
    pub bib_id: String,
    pub call_number: Option<String>,
    pub location: Option<String>,
    pub shelving_location: Option<String>,
    pub status: Option<String>,
    pub media_type: Option<String>,
    pub due_date: Option<String>,
    pub date_created: Option<String>,
    pub last_checkin_date: Option<String>,
    pub ytd_checkouts: Option<String>,
    pub total_checkouts: Option<String>,
    pub suppressed: bool,
}

/// Outcome of fetching item details for a list of identifiers.
///
/// `had_errors` is set when any batch failed or any item could not be
/// decoded; the surviving items are still returned so the caller can decide
/// whether partial results are usable.
#[derive(Debug, Default)]
pub struct ItemFetch {
    pub items: Vec<ItemChangeInfo>,
    pub had_errors: bool,
}

/// Field names the ILS sends that carry no data the merge consumes.
const IGNORED_ITEM_FIELDS: &[&str] = &[
    "AlternateStatus",
    "BranchName",
    "BranchNumber",
    "CNLabels",
    "Caption",
    "Chronology",
    "CreatedBy",
    "EditDate",
    "Enumeration",
    "HoldsHistory",
    "ISID",
    "InHouseCirc",
    "LastUpdatedBy",
    "LocationName",
    "LocationNumber",
    "MediaNumber",
    "Notes",
    "Number",
    "OwningBranchCode",
    "OwningBranchName",
    "OwningBranchNumber",
    "OwningLocationCode",
    "OwningLocationName",
    "OwningLocationNumber",
    "Part",
    "Price",
    "ReserveBranchCode",
    "ReserveBranchLocation",
    "ReserveCallNumber",
    "ReserveType",
    "Status",
    "StatusDate",
    "Suffix",
    "ThereAtLeastOneNote",
    "Type",
    "Volume",
];

/// Fetches current details for the given item identifiers, batch by batch.
///
/// A failed batch is logged and skipped; the remaining batches are still
/// fetched so one bad request does not discard the whole change set.
pub async fn fetch_item_details<T: SoapTransport>(
    transport: &T,
    item_ids: &[String],
    profile: &IndexingProfileConfig,
) -> ItemFetch {
    let mut fetch = ItemFetch::default();
    for batch in batch::batches(item_ids) {
        let request = envelope::item_information_request(batch);
        let statuses = match transport.post_envelope(&request).await {
            Ok(body) => envelope::parse_item_information(&body),
            Err(err) => Err(err),
        };
        match statuses {
            Ok(statuses) => {
                for status in &statuses {
                    match decode_item_status(status, profile) {
                        Some(item) => fetch.items.push(item),
                        None => fetch.had_errors = true,
                    }
                }
            }
            Err(err) => {
                error!(batch_size = batch.len(), error = %err, "item detail batch failed");
                fetch.had_errors = true;
            }
        }
    }
    debug!(
        requested = item_ids.len(),
        fetched = fetch.items.len(),
        had_errors = fetch.had_errors,
        "item detail fetch complete"
    );
    fetch
}

fn decode_item_status(status: &Element, profile: &IndexingProfileConfig) -> Option<ItemChangeInfo> {
    let mut item = ItemChangeInfo::default();
    for field in status.children() {
        let value = field.text();
        match field.name() {
            "ItemID" => item.item_id = value.to_string(),
            "BID" => item.bib_id = value.to_string(),
            "CallNumber" | "CallNumberFull" => {
                // CallNumberFull wins when both are present.
                if field.name() == "CallNumberFull" || item.call_number.is_none() {
                    item.call_number = Some(value.to_string());
                }
            }
            "BranchCode" => item.location = Some(value.to_string()),
            "LocationCode" => item.shelving_location = Some(value.to_string()),
            "StatusCode" => item.status = Some(value.to_string()),
            "MediaCode" => item.media_type = Some(value.to_string()),
            "DueDate" => item.due_date = reformat_date(value, &profile.due_date_format),
            "CreationDate" => {
                item.date_created = reformat_date(value, &profile.date_created_format);
            }
            "LastCheckinDate" => {
                item.last_checkin_date = reformat_date(value, &profile.last_checkin_format);
            }
            "CircHistory" => item.ytd_checkouts = Some(value.to_string()),
            "CumulativeHistory" => item.total_checkouts = Some(value.to_string()),
            "Suppress" => item.suppressed = matches!(value, "true" | "1"),
            other if IGNORED_ITEM_FIELDS.contains(&other) => {}
            other => {
                warn!(field = other, "skipping unexpected item status field");
            }
        }
    }

    if item.item_id.is_empty() || item.bib_id.is_empty() {
        warn!(
            item_id = item.item_id,
            bib_id = item.bib_id,
            "item status without identifier or owning bib, skipping"
        );
        return None;
    }
    Some(item)
}

/// Reformats an ILS timestamp into the profile-configured display pattern.
///
/// Empty input means the field is unset. A value that cannot be parsed or
/// reformatted is logged and dropped rather than failing the item.
fn reformat_date(value: &str, pattern: &str) -> Option<String> {
    if value.is_empty() {
        return None;
    }
    let parsed = match DateTime::<FixedOffset>::parse_from_rfc3339(value) {
        Ok(parsed) => parsed,
        Err(err) => {
            error!(value, error = %err, "unparseable item date");
            return None;
        }
    };
    let mut formatted = String::new();
    if write!(formatted, "{}", parsed.format(pattern)).is_err() {
        error!(pattern, "invalid date pattern in profile");
        return None;
    }
    Some(formatted)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile() -> IndexingProfileConfig {
        serde_json::from_value(serde_json::json!({
            "name": "ils",
            "record_store_path": "/tmp/records",
            "bulk_export_path": "/tmp/export",
        }))
        .unwrap()
    }

    fn status_element(inner: &str) -> Element {
        Element::parse(&format!("<ItemStatus>{inner}</ItemStatus>")).unwrap()
    }

    #[test]
    fn decodes_the_known_field_names() {
        let status = status_element(
            "<ItemID>I1</ItemID><BID>12345</BID>\
             <StatusCode>S</StatusCode><BranchCode>MAIN</BranchCode>\
             <LocationCode>FIC</LocationCode><MediaCode>BOOK</MediaCode>\
             <CallNumberFull>FIC ABC</CallNumberFull>\
             <CircHistory>3</CircHistory><CumulativeHistory>17</CumulativeHistory>\
             <DueDate>2024-05-02T00:00:00.000-05:00</DueDate>\
             <Suppress>true</Suppress>",
        );
        let item = decode_item_status(&status, &profile()).unwrap();
        assert_eq!(item.item_id, "I1");
        assert_eq!(item.bib_id, "12345");
        assert_eq!(item.status.as_deref(), Some("S"));
        assert_eq!(item.location.as_deref(), Some("MAIN"));
        assert_eq!(item.shelving_location.as_deref(), Some("FIC"));
        assert_eq!(item.media_type.as_deref(), Some("BOOK"));
        assert_eq!(item.call_number.as_deref(), Some("FIC ABC"));
        assert_eq!(item.ytd_checkouts.as_deref(), Some("3"));
        assert_eq!(item.total_checkouts.as_deref(), Some("17"));
        assert_eq!(item.due_date.as_deref(), Some("05-02-24"));
        assert!(item.suppressed);
    }

    #[test]
    fn absent_fields_stay_unset() {
        let status = status_element("<ItemID>I1</ItemID><BID>1</BID>");
        let item = decode_item_status(&status, &profile()).unwrap();
        assert_eq!(item.status, None);
        assert_eq!(item.due_date, None);
        assert!(!item.suppressed);
    }

    #[test]
    fn known_silent_fields_are_skipped_without_effect() {
        let status = status_element(
            "<ItemID>I1</ItemID><BID>1</BID><StatusCode>S</StatusCode>\
             <EditDate>2024-05-02T00:00:00.000-05:00</EditDate>\
             <Notes>handle with care</Notes><Volume>v.2</Volume>\
             <ReserveType>0</ReserveType><OwningBranchCode>MAIN</OwningBranchCode>\
             <StatusDate>2024-05-02T00:00:00.000-05:00</StatusDate>",
        );
        let item = decode_item_status(&status, &profile()).unwrap();
        assert_eq!(item.status.as_deref(), Some("S"));
        assert_eq!(item.location, None);
        assert_eq!(item.due_date, None);
    }

    #[test]
    fn item_without_owning_bib_is_skipped() {
        let status = status_element("<ItemID>I1</ItemID>");
        assert!(decode_item_status(&status, &profile()).is_none());
    }

    #[test]
    fn unparseable_date_is_dropped_not_fatal() {
        let status = status_element(
            "<ItemID>I1</ItemID><BID>1</BID><DueDate>yesterday</DueDate>",
        );
        let item = decode_item_status(&status, &profile()).unwrap();
        assert_eq!(item.due_date, None);
    }

    #[test]
    fn full_call_number_wins_over_short_form() {
        let status = status_element(
            "<ItemID>I1</ItemID><BID>1</BID>\
             <CallNumber>FIC</CallNumber><CallNumberFull>FIC ABC</CallNumberFull>",
        );
        let item = decode_item_status(&status, &profile()).unwrap();
        assert_eq!(item.call_number.as_deref(), Some("FIC ABC"));
    }
}
