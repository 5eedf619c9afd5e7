use async_trait::async_trait;
use chrono::NaiveDate;
use gtfs_feed_archive::archive::FeedDescriptor;
use gtfs_feed_archive::fetch::{BasicClient, HttpClient};
use gtfs_feed_archive::lifecycle::artifacts::Artifact;
use gtfs_feed_archive::lifecycle::batch::download_or_build_all;
use gtfs_feed_archive::lifecycle::state::FeedState;
use gtfs_feed_archive::lifecycle::{ControllerOptions, FeedController, Rebuild};
use gtfs_feed_archive::models::GtfsTable;
use gtfs_feed_archive::services::blob_store::BlobStore;
use gtfs_feed_archive::{FeedError, Result};
use md5::{Digest, Md5};
use std::collections::HashMap;
use std::io::Write;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use zip::write::SimpleFileOptions;

const FEED_INFO: &str = "feed_publisher_name,feed_publisher_url,feed_lang,feed_start_date,feed_end_date,feed_version\n\
MBTA,http://www.mbta.com,EN,20240308,20240601,Spring 2024\n";
const CALENDAR: &str = "service_id,monday,tuesday,wednesday,thursday,friday,saturday,sunday,start_date,end_date\n\
wkdy,1,1,1,1,1,0,0,20240308,20240601\n";
const ROUTES: &str = "route_id,agency_id,route_short_name,route_long_name,route_type,line_id\n\
Red,1,,Red Line,1,line-Red\n";
const ROUTE_PATTERNS: &str = "route_pattern_id,route_id,direction_id,route_pattern_typicality,route_pattern_sort_order,representative_trip_id\n\
Red-1-0,Red,0,2,10,t2\n\
Red-3-0,Red,0,1,20,t1\n";
const STOPS: &str = "stop_id,stop_name,stop_lat,stop_lon,location_type,wheelchair_boarding\n\
alfcl,Alewife,42.3954,-71.1425,1,1\n\
davis,Davis,42.3967,-71.1218,,1\n\
portr,Porter,42.3884,-71.1191,1,\n";
const TRIPS: &str = "route_id,service_id,trip_id,trip_headsign,direction_id,shape_id,wheelchair_accessible\n\
Red,wkdy,t1,Ashmont,0,shape-1,1\n\
Red,wkdy,t2,Braintree,0,shape-2,1\n";
const STOP_TIMES: &str = "trip_id,arrival_time,departure_time,stop_id,stop_sequence\n\
t1,05:16:00,05:16:00,alfcl,1\n\
t1,05:18:00,05:18:30,davis,2\n\
t1,05:20:00,05:20:30,portr,10\n\
t2,24:55:00,24:55:00,alfcl,1\n\
t2,25:01:00,25:01:00,davis,2\n";
const SHAPES: &str = "shape_id,shape_pt_lat,shape_pt_lon,shape_pt_sequence,shape_dist_traveled\n\
shape-1,42.3954,-71.1425,2,\n\
shape-1,42.3967,-71.1218,1,\n\
shape-1,42.3884,-71.1191,3,\n\
shape-2,42.3954,-71.1425,1,\n";

fn feed_tables() -> Vec<(&'static str, &'static str)> {
    vec![
        ("feed_info.txt", FEED_INFO),
        ("calendar.txt", CALENDAR),
        ("routes.txt", ROUTES),
        ("route_patterns.txt", ROUTE_PATTERNS),
        ("stops.txt", STOPS),
        ("trips.txt", TRIPS),
        ("stop_times.txt", STOP_TIMES),
        ("shapes.txt", SHAPES),
    ]
}

fn zip_bytes(prefix: &str, tables: &[(&str, &str)]) -> Vec<u8> {
    let mut zip = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
    for (name, contents) in tables {
        zip.start_file(format!("{prefix}{name}"), SimpleFileOptions::default())
            .unwrap();
        zip.write_all(contents.as_bytes()).unwrap();
    }
    zip.finish().unwrap().into_inner()
}

/// Serves fixed bodies over HTTP and counts the requests it receives.
struct FixtureServer {
    base: String,
    requests: Arc<AtomicUsize>,
}

impl FixtureServer {
    async fn start(routes: HashMap<String, Vec<u8>>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        let requests = Arc::new(AtomicUsize::new(0));
        let counter = requests.clone();
        let routes = Arc::new(routes);

        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                counter.fetch_add(1, Ordering::SeqCst);
                let routes = routes.clone();
                tokio::spawn(async move {
                    let mut buf = vec![0u8; 8192];
                    let mut read = 0;
                    while read < buf.len() {
                        let n = socket.read(&mut buf[read..]).await.unwrap_or(0);
                        if n == 0 {
                            break;
                        }
                        read += n;
                        if buf[..read].windows(4).any(|w| w == b"\r\n\r\n") {
                            break;
                        }
                    }
                    let request = String::from_utf8_lossy(&buf[..read]);
                    let path = request.split_whitespace().nth(1).unwrap_or("/").to_string();
                    let (status, body) = match routes.get(&path) {
                        Some(body) => ("200 OK", body.clone()),
                        None => ("404 Not Found", Vec::new()),
                    };
                    let head = format!(
                        "HTTP/1.1 {status}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                        body.len()
                    );
                    let _ = socket.write_all(head.as_bytes()).await;
                    let _ = socket.write_all(&body).await;
                    let _ = socket.shutdown().await;
                });
            }
        });

        Self { base, requests }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }
}

#[derive(Default)]
struct MemoryBlobStore {
    objects: Mutex<HashMap<String, Vec<u8>>>,
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let objects = self.objects.lock().unwrap();
        Ok(objects.keys().filter(|k| k.starts_with(prefix)).cloned().collect())
    }

    async fn get_to_file(&self, key: &str, path: &Path) -> Result<()> {
        let body = self.objects.lock().unwrap().get(key).cloned();
        match body {
            Some(body) => Ok(std::fs::write(path, body)?),
            None => Err(FeedError::TransientTransportFailure(format!("no such key {key}"))),
        }
    }

    async fn put_file(&self, key: &str, path: &Path) -> Result<()> {
        let body = std::fs::read(path)?;
        self.objects.lock().unwrap().insert(key.to_string(), body);
        Ok(())
    }
}

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn http() -> Arc<dyn HttpClient> {
    Arc::new(BasicClient::new().unwrap())
}

fn controller(root: &Path, url: String, options: ControllerOptions) -> FeedController {
    let feed = FeedDescriptor::new(date(2024, 3, 8), date(2024, 6, 1), "Spring 2024", url).unwrap();
    FeedController::new(feed, root, options, http())
}

async fn serve_feed(zip: Vec<u8>) -> FixtureServer {
    FixtureServer::start(HashMap::from([("/20240308.zip".to_string(), zip)])).await
}

#[tokio::test]
async fn test_full_pipeline() {
    let zip = zip_bytes("", &feed_tables());
    let checksum = format!("{:x}", Md5::digest(&zip));
    let server = serve_feed(zip).await;
    let root = tempfile::tempdir().unwrap();
    let mut feed = controller(root.path(), server.url("/20240308.zip"), ControllerOptions::default());

    assert_eq!(feed.state(), FeedState::Absent);
    feed.build_locally(Rebuild::all()).await.unwrap();
    assert_eq!(feed.state(), FeedState::Compacted);
    assert!(feed.exists_locally());
    assert!(!feed.path(Artifact::Archive).with_extension("zip.part").exists());

    let primary = feed.open_primary_store().unwrap();
    assert_eq!(primary.row_count(GtfsTable::StopTimes).unwrap(), 5);
    assert_eq!(primary.row_count(GtfsTable::Shapes).unwrap(), 4);
    assert_eq!(primary.row_count(GtfsTable::Stops).unwrap(), 3);
    assert_eq!(primary.row_count(GtfsTable::Lines).unwrap(), 0);

    let infos = primary.feed_infos().unwrap();
    assert_eq!(infos.len(), 1);
    assert_eq!(infos[0].feed_version.as_deref(), Some("Spring 2024"));
    assert_eq!(infos[0].zip_md5_checksum.as_deref(), Some(checksum.as_str()));
    assert_eq!(
        infos[0].retrieved_from_url.as_deref(),
        Some(server.url("/20240308.zip").as_str())
    );

    let shape = primary.shape_for_route("Red").unwrap();
    let sequences: Vec<i64> = shape.iter().map(|p| p.sequence).collect();
    assert_eq!(sequences, [1, 2, 3]);
    assert!(shape.iter().all(|p| p.shape_id == "shape-1"));

    let compact = feed.open_store().unwrap();
    assert_eq!(compact.row_count(GtfsTable::StopTimes).unwrap(), 0);
    assert_eq!(compact.row_count(GtfsTable::Shapes).unwrap(), 0);
    assert_eq!(compact.row_count(GtfsTable::Trips).unwrap(), 2);
    assert_eq!(compact.row_count(GtfsTable::RoutePatterns).unwrap(), 2);

    let trips = compact.trip_aggregates().unwrap();
    assert_eq!(trips[0].trip_id, "t1");
    assert_eq!((trips[0].start_time, trips[0].end_time, trips[0].stop_count), (18960, 19200, 3));
    assert_eq!(trips[1].trip_id, "t2");
    assert_eq!((trips[1].start_time, trips[1].end_time), (89700, 90060));
}

#[tokio::test]
async fn test_repeated_builds_are_idempotent() {
    let server = serve_feed(zip_bytes("", &feed_tables())).await;
    let root = tempfile::tempdir().unwrap();
    let mut feed = controller(root.path(), server.url("/20240308.zip"), ControllerOptions::default());

    feed.download_or_build().await.unwrap();
    let first = feed.open_primary_store().unwrap();
    let (infos, trips) = (first.feed_infos().unwrap(), first.trip_aggregates().unwrap());
    let counts: Vec<(GtfsTable, i64)> = GtfsTable::INGEST_ORDER
        .into_iter()
        .map(|table| (table, first.row_count(table).unwrap()))
        .collect();
    assert!(counts.iter().any(|(_, count)| *count > 0));
    drop(first);

    feed.download_or_build().await.unwrap();
    feed.build_locally(Rebuild::missing()).await.unwrap();
    assert_eq!(server.requests(), 1);

    feed.build_locally(Rebuild::all()).await.unwrap();
    assert_eq!(server.requests(), 1);
    let rebuilt = feed.open_primary_store().unwrap();
    assert_eq!(rebuilt.feed_infos().unwrap(), infos);
    assert_eq!(rebuilt.trip_aggregates().unwrap(), trips);
    for (table, count) in counts {
        assert_eq!(rebuilt.row_count(table).unwrap(), count, "{table}");
    }
}

#[tokio::test]
async fn test_pipe_delimited_feed_builds() {
    let piped: Vec<(&str, String)> = feed_tables()
        .into_iter()
        .map(|(name, contents)| (name, contents.replace(',', "|")))
        .collect();
    let tables: Vec<(&str, &str)> = piped.iter().map(|(name, c)| (*name, c.as_str())).collect();
    let server = serve_feed(zip_bytes("", &tables)).await;
    let root = tempfile::tempdir().unwrap();
    let mut feed = controller(root.path(), server.url("/20240308.zip"), ControllerOptions::default());

    feed.build_locally(Rebuild::all()).await.unwrap();
    assert_eq!(feed.state(), FeedState::Compacted);
    let store = feed.open_primary_store().unwrap();
    assert_eq!(store.row_count(GtfsTable::StopTimes).unwrap(), 5);
    assert_eq!(store.row_count(GtfsTable::Stops).unwrap(), 3);
    assert_eq!(store.feed_infos().unwrap()[0].feed_version.as_deref(), Some("Spring 2024"));
    let trips = store.trip_aggregates().unwrap();
    assert_eq!((trips[0].start_time, trips[0].end_time, trips[0].stop_count), (18960, 19200, 3));
}

#[tokio::test]
async fn test_wrapped_archive_is_hoisted() {
    let server = serve_feed(zip_bytes("MBTA_GTFS/", &feed_tables())).await;
    let root = tempfile::tempdir().unwrap();
    let mut feed = controller(root.path(), server.url("/20240308.zip"), ControllerOptions::default());

    feed.build_locally(Rebuild::all()).await.unwrap();
    let extracted = feed.path(Artifact::Extracted);
    assert!(extracted.join("stops.txt").is_file());
    assert!(!extracted.join("MBTA_GTFS").exists());
    let store = feed.open_primary_store().unwrap();
    assert_eq!(store.row_count(GtfsTable::Stops).unwrap(), 3);
}

#[tokio::test]
async fn test_compact_only_keeps_just_the_compact_store() {
    let server = serve_feed(zip_bytes("", &feed_tables())).await;
    let root = tempfile::tempdir().unwrap();
    let options = ControllerOptions {
        compact_only: true,
        ..Default::default()
    };
    let mut feed = controller(root.path(), server.url("/20240308.zip"), options);

    feed.download_or_build().await.unwrap();
    assert!(feed.exists_locally());
    assert!(!feed.path(Artifact::PrimaryStore).exists());
    assert_eq!(feed.state(), FeedState::Compacted);
    assert_eq!(feed.open_store().unwrap().row_count(GtfsTable::Trips).unwrap(), 2);
    assert!(matches!(
        feed.open_primary_store(),
        Err(FeedError::PreconditionFailed(_))
    ));

    feed.download_or_build().await.unwrap();
    assert!(!feed.path(Artifact::PrimaryStore).exists());

    feed.build_locally(Rebuild { db: false, compact: true }).await.unwrap();
    assert!(!feed.path(Artifact::PrimaryStore).exists());
    assert_eq!(server.requests(), 1);
}

#[tokio::test]
async fn test_failed_ingest_leaves_no_store() {
    let mut tables = feed_tables();
    tables.push(("calendar_dates.txt", "service_id,date,exception_type\nwkdy,2024-05-27,2\n"));
    let server = serve_feed(zip_bytes("", &tables)).await;
    let root = tempfile::tempdir().unwrap();
    let mut feed = controller(root.path(), server.url("/20240308.zip"), ControllerOptions::default());

    let err = feed.build_locally(Rebuild::all()).await.unwrap_err();
    assert!(matches!(err, FeedError::MalformedValue { .. }));
    assert!(!err.is_retryable());
    assert_eq!(feed.state(), FeedState::Failed);
    assert!(!feed.path(Artifact::PrimaryStore).exists());
    assert!(!feed.path(Artifact::CompactStore).exists());
    assert!(feed.path(Artifact::Extracted).is_dir());
}

#[tokio::test]
async fn test_trip_without_stop_times_fails_the_build() {
    let mut tables = feed_tables();
    tables.retain(|(name, _)| *name != "trips.txt");
    tables.push(("trips.txt", "route_id,service_id,trip_id\nRed,wkdy,t1\nRed,wkdy,t9\n"));
    let server = serve_feed(zip_bytes("", &tables)).await;
    let root = tempfile::tempdir().unwrap();
    let mut feed = controller(root.path(), server.url("/20240308.zip"), ControllerOptions::default());

    let err = feed.download_or_build().await.unwrap_err();
    assert!(matches!(err, FeedError::MissingDependency(_)));
    assert!(!feed.path(Artifact::PrimaryStore).exists());
}

#[tokio::test]
async fn test_batch_isolates_corrupt_archives() {
    let server = FixtureServer::start(HashMap::from([
        ("/good.zip".to_string(), zip_bytes("", &feed_tables())),
        ("/bad.zip".to_string(), "<html><body>504 gateway timeout</body></html>\n".repeat(8).into_bytes()),
    ]))
    .await;
    let root = tempfile::tempdir().unwrap();
    let bad = FeedDescriptor::new(date(2024, 1, 5), date(2024, 3, 7), "Winter", server.url("/bad.zip")).unwrap();
    let good = FeedDescriptor::new(date(2024, 3, 8), date(2024, 6, 1), "Spring", server.url("/good.zip")).unwrap();
    let mut controllers = vec![
        FeedController::new(bad, root.path(), ControllerOptions::default(), http()),
        FeedController::new(good, root.path(), ControllerOptions::default(), http()),
    ];

    let outcomes = download_or_build_all(&mut controllers).await;
    assert_eq!(outcomes.len(), 2);
    assert_eq!(outcomes[0].feed_key, "20240105");
    assert!(!outcomes[0].succeeded());
    assert!(outcomes[0].error.as_deref().unwrap_or("").contains("corrupt archive"));
    assert_eq!(outcomes[0].state, FeedState::Failed);
    assert!(outcomes[1].succeeded());
    assert_eq!(outcomes[1].state, FeedState::Compacted);
}

#[tokio::test]
async fn test_missing_archive_is_a_transport_failure() {
    let server = FixtureServer::start(HashMap::new()).await;
    let root = tempfile::tempdir().unwrap();
    let mut feed = controller(root.path(), server.url("/20240308.zip"), ControllerOptions::default());

    let err = feed.download_or_build().await.unwrap_err();
    assert!(err.is_retryable());
    assert!(!feed.path(Artifact::Archive).exists());
}

#[tokio::test]
async fn test_remote_store_round_trip() {
    let server = serve_feed(zip_bytes("", &feed_tables())).await;
    let remote = Arc::new(MemoryBlobStore::default());
    let builder_root = tempfile::tempdir().unwrap();
    let mut builder = controller(builder_root.path(), server.url("/20240308.zip"), ControllerOptions::default())
        .with_remote(remote.clone());

    assert!(!builder.exists_remotely().await.unwrap());
    assert!(matches!(builder.upload().await, Err(FeedError::PreconditionFailed(_))));
    builder.download_or_build().await.unwrap();
    builder.upload().await.unwrap();
    assert!(builder.exists_remotely().await.unwrap());

    let mut keys = remote.list("20240308/").await.unwrap();
    keys.sort();
    assert_eq!(keys, ["20240308/gtfs.sqlite3", "20240308/gtfs_compact.sqlite3"]);

    let reader_root = tempfile::tempdir().unwrap();
    let mut reader = controller(reader_root.path(), server.url("/20240308.zip"), ControllerOptions::default())
        .with_remote(remote.clone());
    reader.download_or_build().await.unwrap();
    assert_eq!(server.requests(), 1);
    assert!(reader.exists_locally());
    assert!(!reader.path(Artifact::Archive).exists());
    assert_eq!(reader.open_store().unwrap().row_count(GtfsTable::Trips).unwrap(), 2);
}

#[tokio::test]
async fn test_partial_remote_listing_is_not_remote() {
    let remote = Arc::new(MemoryBlobStore::default());
    remote
        .objects
        .lock()
        .unwrap()
        .insert("20240308/gtfs_compact.sqlite3".to_string(), b"sqlite".to_vec());
    let root = tempfile::tempdir().unwrap();
    let feed = controller(root.path(), "http://127.0.0.1:9/20240308.zip".into(), ControllerOptions::default())
        .with_remote(remote.clone());

    assert!(!feed.exists_remotely().await.unwrap());
    assert!(matches!(feed.download().await, Err(FeedError::PreconditionFailed(_))));
    assert!(!feed.path(Artifact::CompactStore).exists());

    let compact_only = ControllerOptions {
        compact_only: true,
        ..Default::default()
    };
    let feed = controller(root.path(), "http://127.0.0.1:9/20240308.zip".into(), compact_only).with_remote(remote);
    assert!(feed.exists_remotely().await.unwrap());
}

#[tokio::test]
async fn test_remote_operations_need_a_remote() {
    let root = tempfile::tempdir().unwrap();
    let feed = controller(root.path(), "http://127.0.0.1:9/20240308.zip".into(), ControllerOptions::default());
    assert!(!feed.exists_remotely().await.unwrap());
    assert!(matches!(feed.download().await, Err(FeedError::PreconditionFailed(_))));
    assert!(matches!(feed.upload().await, Err(FeedError::PreconditionFailed(_))));

    let remote = Arc::new(MemoryBlobStore::default());
    let feed = controller(root.path(), "http://127.0.0.1:9/20240308.zip".into(), ControllerOptions::default())
        .with_remote(remote);
    assert!(matches!(feed.download().await, Err(FeedError::PreconditionFailed(_))));
}

#[tokio::test]
async fn test_delete_and_purge() {
    let server = serve_feed(zip_bytes("", &feed_tables())).await;
    let root = tempfile::tempdir().unwrap();
    let mut feed = controller(root.path(), server.url("/20240308.zip"), ControllerOptions::default());
    feed.download_or_build().await.unwrap();

    feed.delete_locally().unwrap();
    assert!(!feed.exists_locally());
    assert_eq!(feed.state(), FeedState::Extracted);
    assert!(feed.artifacts().dir().is_dir());

    feed.download_or_build().await.unwrap();
    assert_eq!(server.requests(), 1);

    feed.purge_locally().unwrap();
    assert!(!feed.artifacts().dir().exists());
    assert_eq!(feed.state(), FeedState::Absent);
}
