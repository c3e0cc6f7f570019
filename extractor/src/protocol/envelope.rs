//! Request templates and response decoding for the four MarcOut operations.
//!
//! Every response carries a `ResponseStatuses/ResponseStatus/Code` block. The
//! service reports success with the literal code `"0"`; any other code is a
//! protocol failure and the optional `ShortMessage` is surfaced in the error.

use chrono::{DateTime, Utc};
use quick_xml::escape::escape;
use tracing::warn;

use crate::error::{ErrorKind, ExtractResult};
use crate::extract_error;
use crate::marc::{ControlField, DataField, Record};
use crate::protocol::xml::Element;

const SOAP_ENV_NS: &str = "http://schemas.xmlsoap.org/soap/envelope/";
const MARCOUT_NS: &str = "http://tlcdelivers.com/cx/schemas/marcoutAPI";
const REQUEST_NS: &str = "http://tlcdelivers.com/cx/schemas/request";

/// Status code the service uses to signal success.
pub const SUCCESS_STATUS_CODE: &str = "0";

/// Control field payloads occasionally arrive with a literal rendering of the
/// field terminator appended by the remote serializer.
const FIELD_TERMINATOR_ARTIFACT: &str = "{U+001E}";

/// Formats a change-detection begin time the way the service expects it,
/// seconds precision in UTC.
pub fn format_begin_time(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

fn envelope(body: &str) -> String {
    format!(
        "<soapenv:Envelope xmlns:soapenv=\"{SOAP_ENV_NS}\" xmlns:mar=\"{MARCOUT_NS}\" xmlns:req=\"{REQUEST_NS}\">\
         <soapenv:Header/><soapenv:Body>{body}</soapenv:Body></soapenv:Envelope>"
    )
}

/// Builds a `GetChangedBibs` request for all bib changes since `begin_time`.
///
/// Suppression changes are reported as bib updates so a newly suppressed bib
/// is re-synthesized and dropped from discovery.
pub fn changed_bibs_request(begin_time: &str) -> String {
    envelope(&format!(
        "<mar:GetChangedBibsRequest>\
         <mar:BeginTime>{}</mar:BeginTime>\
         <mar:SuppressionAsUpdate>1</mar:SuppressionAsUpdate>\
         <req:Modifiers/>\
         </mar:GetChangedBibsRequest>",
        escape(begin_time)
    ))
}

/// Builds a `GetChangedItems` request for all item changes since `begin_time`.
pub fn changed_items_request(begin_time: &str) -> String {
    envelope(&format!(
        "<mar:GetChangedItemsRequest>\
         <mar:BeginTime>{}</mar:BeginTime>\
         <req:Modifiers/>\
         </mar:GetChangedItemsRequest>",
        escape(begin_time)
    ))
}

/// Builds a `GetItemInformation` request for a batch of item identifiers.
pub fn item_information_request(item_ids: &[String]) -> String {
    let mut body = String::from("<mar:GetItemInformationRequest>");
    body.push_str("<mar:ItemSearchType>ITEM</mar:ItemSearchType>");
    for item_id in item_ids {
        body.push_str(&format!("<mar:ItemSearchTerm>{}</mar:ItemSearchTerm>", escape(item_id)));
    }
    body.push_str("<mar:IncludeSuppressItems>true</mar:IncludeSuppressItems>");
    body.push_str("<req:Modifiers/>");
    body.push_str("</mar:GetItemInformationRequest>");
    envelope(&body)
}

/// Builds a `GetMARCRecords` request for a batch of bib identifiers.
///
/// Item holdings data is explicitly excluded; holdings are synthesized locally
/// from item change information instead.
pub fn marc_records_request(bib_ids: &[String]) -> String {
    let mut body = String::from("<mar:GetMARCRecordsRequest>");
    for bib_id in bib_ids {
        body.push_str(&format!("<mar:BID>{}</mar:BID>", escape(bib_id)));
    }
    body.push_str("<mar:Include949ItemData>0</mar:Include949ItemData>");
    body.push_str("<mar:IncludeOnlyUnsuppressed>0</mar:IncludeOnlyUnsuppressed>");
    body.push_str("<req:Modifiers/>");
    body.push_str("</mar:GetMARCRecordsRequest>");
    envelope(&body)
}

/// Bib or item identifiers partitioned by the kind of change reported.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ChangedIds {
    pub created: Vec<String>,
    pub updated: Vec<String>,
    pub deleted: Vec<String>,
}

/// Decodes a response envelope down to the named operation response element,
/// checking the embedded status block.
pub fn parse_response(xml: &str, operation: &str) -> ExtractResult<Element> {
    let root = Element::parse(xml)?;
    let response = root.required_child("Body")?.required_child(operation)?;
    check_status(response)?;
    Ok(response.clone())
}

fn check_status(response: &Element) -> ExtractResult<()> {
    let status = response
        .required_child("ResponseStatuses")?
        .required_child("ResponseStatus")?;
    let code = status.required_child("Code")?.text();
    if code != SUCCESS_STATUS_CODE {
        let message = status
            .child("ShortMessage")
            .map(Element::text)
            .unwrap_or("no message");
        return Err(extract_error!(
            ErrorKind::ProtocolError,
            "MarcOut reported a failure status",
            format!("code {code}: {message}")
        ));
    }
    Ok(())
}

/// Decodes a `GetChangedBibs` response into created, updated, and deleted
/// bib identifiers.
pub fn parse_changed_bibs(xml: &str) -> ExtractResult<ChangedIds> {
    let response = parse_response(xml, "GetChangedBibsResponse")?;
    Ok(ChangedIds {
        created: collect_ids(&response, "CreatedBibs", "BID"),
        updated: collect_ids(&response, "UpdatedBibs", "BID"),
        deleted: collect_ids(&response, "DeletedBibs", "BID"),
    })
}

/// Decodes a `GetChangedItems` response into created, updated, and deleted
/// item identifiers.
pub fn parse_changed_items(xml: &str) -> ExtractResult<ChangedIds> {
    let response = parse_response(xml, "GetChangedItemsResponse")?;
    Ok(ChangedIds {
        created: collect_ids(&response, "CreatedItems", "ItemID"),
        updated: collect_ids(&response, "UpdatedItems", "ItemID"),
        deleted: collect_ids(&response, "DeletedItems", "ItemID"),
    })
}

fn collect_ids(response: &Element, container: &str, id_tag: &str) -> Vec<String> {
    let Some(container_element) = response.child(container) else {
        return Vec::new();
    };

    let mut ids = Vec::new();
    for child in container_element.children() {
        if child.name() != id_tag {
            warn!(container, unexpected = child.name(), "skipping unexpected change list entry");
            continue;
        }
        let id = child.text();
        if !id.is_empty() {
            ids.push(id.to_string());
        }
    }
    ids
}

/// Decodes a `GetItemInformation` response into its per-item status elements.
pub fn parse_item_information(xml: &str) -> ExtractResult<Vec<Element>> {
    let response = parse_response(xml, "GetItemInformationResponse")?;
    Ok(response
        .children_named("ItemStatus")
        .cloned()
        .collect())
}

/// Decodes a `GetMARCRecords` response into records, in request order. The
/// i-th returned record belongs to the i-th requested bib identifier.
pub fn parse_marc_records(xml: &str) -> ExtractResult<Vec<Record>> {
    let response = parse_response(xml, "GetMARCRecordsResponse")?;
    let mut records = Vec::new();
    for element in response.children_named("MARCRecord") {
        records.push(build_record(element));
    }
    Ok(records)
}

fn build_record(element: &Element) -> Record {
    let mut record = Record::default();
    for field in element.children() {
        match field.name() {
            "leader" => record.leader = field.text().to_string(),
            "controlField" => {
                let Some(tag) = field.attr("tag") else {
                    warn!("control field without a tag attribute, skipping");
                    continue;
                };
                let data = field.text().replace(FIELD_TERMINATOR_ARTIFACT, "");
                record.add_control_field(ControlField::new(tag, data.trim()));
            }
            "dataField" => {
                let Some(tag) = field.attr("tag") else {
                    warn!("data field without a tag attribute, skipping");
                    continue;
                };
                let mut data_field = DataField::new(
                    tag,
                    indicator(field.attr("ind1")),
                    indicator(field.attr("ind2")),
                );
                for subfield in field.children() {
                    let Some(code) = subfield.attr("code").and_then(|code| code.chars().next())
                    else {
                        warn!(tag, "subfield without a code attribute, skipping");
                        continue;
                    };
                    data_field.push_subfield(code, subfield.text());
                }
                record.add_data_field(data_field);
            }
            other => {
                warn!(unexpected = other, "skipping unexpected record element");
            }
        }
    }
    record
}

fn indicator(attr: Option<&str>) -> char {
    attr.and_then(|value| value.chars().next()).unwrap_or(' ')
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn wrap(operation: &str, inner: &str) -> String {
        format!(
            "<SOAP-ENV:Envelope xmlns:SOAP-ENV=\"{SOAP_ENV_NS}\"><SOAP-ENV:Body>\
             <ns4:{operation} xmlns:ns4=\"{MARCOUT_NS}\">\
             <ns4:ResponseStatuses><ns4:ResponseStatus><ns4:Code>0</ns4:Code>\
             </ns4:ResponseStatus></ns4:ResponseStatuses>{inner}</ns4:{operation}>\
             </SOAP-ENV:Body></SOAP-ENV:Envelope>"
        )
    }

    #[test]
    fn begin_time_uses_utc_seconds_precision() {
        let at = Utc.with_ymd_and_hms(2023, 11, 14, 22, 13, 20).unwrap();
        assert_eq!(format_begin_time(at), "2023-11-14T22:13:20Z");
    }

    #[test]
    fn changed_bibs_request_includes_begin_time() {
        let request = changed_bibs_request("2023-11-14T22:13:20Z");
        assert!(request.contains("<mar:GetChangedBibsRequest>"));
        assert!(request.contains("<mar:BeginTime>2023-11-14T22:13:20Z</mar:BeginTime>"));
        assert!(request.contains("soapenv:Envelope"));
    }

    #[test]
    fn changed_bibs_request_reports_suppression_as_update() {
        let request = changed_bibs_request("2023-11-14T22:13:20Z");
        let suppression = "<mar:SuppressionAsUpdate>1</mar:SuppressionAsUpdate>";
        assert!(request.contains(suppression));
        let after_begin_time = request.find("</mar:BeginTime>").unwrap();
        assert!(request.find(suppression).unwrap() > after_begin_time);
        assert!(request.find(suppression).unwrap() < request.find("<req:Modifiers/>").unwrap());
    }

    #[test]
    fn item_information_request_sends_one_search_type_before_the_terms() {
        let request = item_information_request(&["I1".to_string(), "I2".to_string()]);
        let search_type = "<mar:ItemSearchType>ITEM</mar:ItemSearchType>";
        assert_eq!(request.matches(search_type).count(), 1);
        assert!(request.contains("<mar:ItemSearchTerm>I1</mar:ItemSearchTerm>"));
        assert!(request.contains("<mar:ItemSearchTerm>I2</mar:ItemSearchTerm>"));
        assert!(request.find(search_type).unwrap() < request.find("I1").unwrap());
    }

    #[test]
    fn marc_records_request_excludes_item_data() {
        let request = marc_records_request(&["12345".to_string(), "678".to_string()]);
        assert!(request.contains("<mar:BID>12345</mar:BID>"));
        assert!(request.contains("<mar:BID>678</mar:BID>"));
        assert!(request.contains("<mar:Include949ItemData>0</mar:Include949ItemData>"));
    }

    #[test]
    fn parses_changed_bibs_by_change_kind() {
        let xml = wrap(
            "GetChangedBibsResponse",
            "<ns4:CreatedBibs><ns4:BID>1</ns4:BID></ns4:CreatedBibs>\
             <ns4:UpdatedBibs><ns4:BID>2</ns4:BID><ns4:BID>3</ns4:BID></ns4:UpdatedBibs>\
             <ns4:DeletedBibs/>",
        );
        let changed = parse_changed_bibs(&xml).unwrap();
        assert_eq!(changed.created, vec!["1"]);
        assert_eq!(changed.updated, vec!["2", "3"]);
        assert!(changed.deleted.is_empty());
    }

    #[test]
    fn missing_container_reads_as_no_changes() {
        let xml = wrap("GetChangedItemsResponse", "");
        let changed = parse_changed_items(&xml).unwrap();
        assert!(changed.created.is_empty());
        assert!(changed.updated.is_empty());
        assert!(changed.deleted.is_empty());
    }

    #[test]
    fn nonzero_status_surfaces_the_short_message() {
        let xml = "<Envelope><Body><GetChangedBibsResponse><ResponseStatuses><ResponseStatus>\
                   <Code>112</Code><ShortMessage>Invalid begin time</ShortMessage>\
                   </ResponseStatus></ResponseStatuses></GetChangedBibsResponse></Body></Envelope>";
        let err = parse_changed_bibs(xml).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ProtocolError);
        assert!(err.detail().unwrap_or_default().contains("Invalid begin time"));
    }

    #[test]
    fn missing_status_code_is_a_missing_field() {
        let xml = "<Envelope><Body><GetChangedBibsResponse><ResponseStatuses>\
                   <ResponseStatus/></ResponseStatuses></GetChangedBibsResponse>\
                   </Body></Envelope>";
        let err = parse_changed_bibs(xml).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MissingProtocolField);
    }

    #[test]
    fn builds_records_from_marc_elements() {
        let xml = wrap(
            "GetMARCRecordsResponse",
            "<ns4:MARCRecord>\
             <ns4:leader>00000cam a2200000 a 4500</ns4:leader>\
             <ns4:controlField ns4:tag=\"001\">12345{U+001E}</ns4:controlField>\
             <ns4:dataField ns4:tag=\"245\" ns4:ind1=\"1\" ns4:ind2=\"0\">\
             <ns4:subField ns4:code=\"a\">Example title</ns4:subField>\
             </ns4:dataField>\
             </ns4:MARCRecord>",
        );
        let records = parse_marc_records(&xml).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].control_number(), Some("12345"));
        let field = records[0].data_fields_with_tag("245").next().unwrap();
        assert_eq!(field.ind1, '1');
        assert_eq!(field.subfield_value('a'), Some("Example title"));
    }

    #[test]
    fn record_without_indicators_defaults_to_blanks() {
        let xml = wrap(
            "GetMARCRecordsResponse",
            "<ns4:MARCRecord><ns4:leader>00000nam a2200000 a 4500</ns4:leader>\
             <ns4:dataField ns4:tag=\"999\">\
             <ns4:subField ns4:code=\"a\">x</ns4:subField></ns4:dataField>\
             </ns4:MARCRecord>",
        );
        let records = parse_marc_records(&xml).unwrap();
        let field = records[0].data_fields_with_tag("999").next().unwrap();
        assert_eq!((field.ind1, field.ind2), (' ', ' '));
    }
}
