//! End-to-end incremental cycle against a scripted transport.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, TimeZone, Utc};
use config::shared::IndexingProfileConfig;
use extractor::collaborators::memory::{MemoryExtractLog, MemoryRecordGrouper, MemoryWorkIndexer};
use extractor::error::{ErrorKind, ExtractError, ExtractResult};
use extractor::extract_error;
use extractor::holds::{MemoryHoldsSink, PgHoldsSource};
use extractor::marc::{ControlField, DataField, Record};
use extractor::orchestrator::{CycleOutcome, CyclePacing, Orchestrator};
use extractor::protocol::client::SoapTransport;
use extractor::state::SyncWatermark;
use extractor::store::records::RecordStore;
use extractor::store::state::{MemoryWatermarkStore, WatermarkStore};

#[derive(Clone)]
struct ScriptedTransport {
    responses: Arc<Mutex<VecDeque<Result<String, ExtractError>>>>,
    requests: Arc<Mutex<Vec<String>>>,
}

impl ScriptedTransport {
    fn new(responses: Vec<Result<String, ExtractError>>) -> Self {
        Self {
            responses: Arc::new(Mutex::new(responses.into_iter().collect())),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn requests(&self) -> Vec<String> {
        self.requests
            .lock()
            .map(|requests| requests.clone())
            .unwrap_or_default()
    }
}

impl SoapTransport for ScriptedTransport {
    async fn post_envelope(&self, envelope: &str) -> ExtractResult<String> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(envelope.to_string());
        }
        self.responses
            .lock()
            .ok()
            .and_then(|mut responses| responses.pop_front())
            .unwrap_or_else(|| Err(extract_error!(ErrorKind::Unknown, "unexpected request")))
    }
}

fn ok_response(operation: &str, inner: &str) -> String {
    format!(
        "<Envelope><Body><{operation}>\
         <ResponseStatuses><ResponseStatus><Code>0</Code></ResponseStatus></ResponseStatuses>\
         {inner}</{operation}></Body></Envelope>"
    )
}

fn profile(dir: &std::path::Path) -> IndexingProfileConfig {
    serde_json::from_value(serde_json::json!({
        "name": "ils",
        "record_store_path": dir.join("records"),
        "bulk_export_path": dir.join("export"),
        "status_subfield": "g",
        "location_subfield": "d",
    }))
    .unwrap()
}

fn watermark_at(epoch_seconds: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(epoch_seconds, 0).single().unwrap()
}

fn orchestrator(
    profile: IndexingProfileConfig,
    transport: ScriptedTransport,
    watermarks: MemoryWatermarkStore,
    grouper: MemoryRecordGrouper,
    indexer: MemoryWorkIndexer,
    log: MemoryExtractLog,
) -> Orchestrator<
    ScriptedTransport,
    MemoryWatermarkStore,
    MemoryRecordGrouper,
    MemoryWorkIndexer,
    PgHoldsSource,
    MemoryHoldsSink,
    impl Fn() -> MemoryExtractLog,
> {
    Orchestrator::new(
        profile,
        CyclePacing::default(),
        transport,
        watermarks,
        grouper,
        indexer,
        None,
        move || log.clone(),
    )
}

fn prior_record() -> Record {
    let mut record = Record::new("00000cam a2200000 a 4500");
    record.add_control_field(ControlField::new("001", "12345"));
    let mut title = DataField::new("245", '1', '0');
    title.push_subfield('a', "An old title");
    record.add_data_field(title);
    let mut holdings = DataField::new("949", ' ', ' ');
    holdings.push_subfield('b', "I1");
    holdings.push_subfield('g', "CHECKEDOUT");
    holdings.push_subfield('z', "untouched");
    record.add_data_field(holdings);
    record
}

#[tokio::test]
async fn an_updated_item_flows_through_a_whole_cycle() {
    let dir = tempfile::tempdir().unwrap();
    let profile = profile(dir.path());
    let store = RecordStore::new(&profile.record_store_path);
    store.save("CARL0000012345", &prior_record()).unwrap();

    let transport = ScriptedTransport::new(vec![
        // No bib-level change; the bib is pulled in by its item.
        Ok(ok_response("GetChangedBibsResponse", "")),
        Ok(ok_response(
            "GetChangedItemsResponse",
            "<UpdatedItems><ItemID>I1</ItemID></UpdatedItems>",
        )),
        Ok(ok_response(
            "GetItemInformationResponse",
            "<ItemStatus><ItemID>I1</ItemID><BID>12345</BID>\
             <StatusCode>AVAILABLE</StatusCode><BranchCode>MAIN</BranchCode></ItemStatus>",
        )),
        Ok(ok_response(
            "GetMARCRecordsResponse",
            "<MARCRecord><leader>00000cam a2200000 a 4500</leader>\
             <controlField tag=\"001\">12345</controlField>\
             <dataField tag=\"245\" ind1=\"1\" ind2=\"0\">\
             <subField code=\"a\">A fresh title</subField></dataField></MARCRecord>",
        )),
    ]);

    let watermarks = MemoryWatermarkStore::with_watermark(SyncWatermark {
        last_changed_records: Some(watermark_at(1_700_000_000)),
        ..SyncWatermark::default()
    });
    let grouper = MemoryRecordGrouper::new();
    let indexer = MemoryWorkIndexer::new();
    let log = MemoryExtractLog::new();

    let outcome = orchestrator(
        profile,
        transport.clone(),
        watermarks.clone(),
        grouper.clone(),
        indexer.clone(),
        log.clone(),
    )
    .run_cycle()
    .await;

    assert_eq!(outcome, CycleOutcome { changes: 1, had_errors: false });
    assert_eq!(log.updated(), 1);
    assert_eq!(log.num_products(), 1);
    assert!(log.is_finished());

    // The merged record keeps the fresh bib fields and exactly one holdings
    // field, updated in place.
    let merged = store.load("CARL0000012345").unwrap().unwrap();
    let title = merged.data_fields_with_tag("245").next().unwrap();
    assert_eq!(title.subfield_value('a'), Some("A fresh title"));
    let holdings: Vec<_> = merged.data_fields_with_tag("949").collect();
    assert_eq!(holdings.len(), 1);
    assert_eq!(holdings[0].subfield_value('b'), Some("I1"));
    assert_eq!(holdings[0].subfield_value('g'), Some("AVAILABLE"));
    assert_eq!(holdings[0].subfield_value('d'), Some("MAIN"));
    assert_eq!(holdings[0].subfield_value('z'), Some("untouched"));

    // Downstream collaborators saw exactly one record.
    assert_eq!(indexer.processed().await, vec!["ils:CARL0000012345"]);

    // The bib fetch excluded item data, and the watermark moved forward.
    let requests = transport.requests();
    assert_eq!(requests.len(), 4);
    assert!(requests[3].contains("<mar:Include949ItemData>0</mar:Include949ItemData>"));
    let watermark = watermarks.load().await.unwrap();
    assert!(watermark.last_changed_records.unwrap() > watermark_at(1_700_000_000));
}

#[tokio::test]
async fn the_begin_time_is_derived_from_the_watermark() {
    let dir = tempfile::tempdir().unwrap();
    let transport = ScriptedTransport::new(vec![
        Ok(ok_response("GetChangedBibsResponse", "")),
        Ok(ok_response("GetChangedItemsResponse", "")),
    ]);
    let watermarks = MemoryWatermarkStore::with_watermark(SyncWatermark {
        last_changed_records: Some(watermark_at(1_700_000_000)),
        ..SyncWatermark::default()
    });

    orchestrator(
        profile(dir.path()),
        transport.clone(),
        watermarks,
        MemoryRecordGrouper::new(),
        MemoryWorkIndexer::new(),
        MemoryExtractLog::new(),
    )
    .run_cycle()
    .await;

    let requests = transport.requests();
    assert_eq!(requests.len(), 2);
    // 1,700,000,000 seconds after the epoch, rendered the way the API wants.
    assert!(requests[0].contains("<mar:BeginTime>2023-11-14T22:13:20Z</mar:BeginTime>"));
}

#[tokio::test]
async fn a_deleted_bib_is_removed_from_store_and_index() {
    let dir = tempfile::tempdir().unwrap();
    let profile = profile(dir.path());
    let store = RecordStore::new(&profile.record_store_path);
    store.save("CARL0000000007", &prior_record()).unwrap();

    let transport = ScriptedTransport::new(vec![
        Ok(ok_response(
            "GetChangedBibsResponse",
            "<DeletedBibs><BID>7</BID></DeletedBibs>",
        )),
        Ok(ok_response("GetChangedItemsResponse", "")),
    ]);
    let watermarks = MemoryWatermarkStore::new();
    let grouper = MemoryRecordGrouper::new();
    grouper.insert_known("ils", "CARL0000000007").await;
    let indexer = MemoryWorkIndexer::new();
    let log = MemoryExtractLog::new();

    let outcome = orchestrator(
        profile,
        transport,
        watermarks,
        grouper.clone(),
        indexer.clone(),
        log.clone(),
    )
    .run_cycle()
    .await;

    assert_eq!(outcome, CycleOutcome { changes: 1, had_errors: false });
    assert_eq!(log.deleted(), 1);
    assert_eq!(store.load("CARL0000000007").unwrap(), None);
    assert_eq!(
        indexer.deleted().await,
        vec![("ils:CARL0000000007".to_string(), "CARL0000000007".to_string())]
    );
}
