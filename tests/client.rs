//! End-to-end tests against the in-process mock server.

mod common;

use std::collections::HashMap;

use chrono::{TimeZone, Utc};
use libftpc::{EntryKind, FtpClient, FtpError};
use pretty_assertions::assert_eq;
use tokio::io::AsyncReadExt;

use common::{handshake_verbs, open_client, FtpMock, MockConfig, TimeProfile};

const TEST_DATA: &str = "Just some text";

fn expect_verbs(mut tail: Vec<&str>) -> Vec<String> {
    let mut verbs = handshake_verbs();
    verbs.extend(tail.drain(..).map(str::to_string));
    verbs
}

#[tokio::test]
async fn dial_login_quit_conversation() {
    let mock = FtpMock::start(TimeProfile::NoTime).await;
    let client = open_client(&mock).await;
    client.quit().await.unwrap();
    assert_eq!(mock.finish().await, expect_verbs(vec!["QUIT"]));
}

#[tokio::test]
async fn pwd_reflects_changed_directory() {
    let mock = FtpMock::start(TimeProfile::NoTime).await;
    let client = open_client(&mock).await;

    client.change_dir("incoming").await.unwrap();
    assert_eq!(client.current_dir().await.unwrap(), "/incoming");

    client.quit().await.unwrap();
}

#[tokio::test]
async fn store_rename_size_resume_delete() {
    let mock = FtpMock::start(TimeProfile::NoTime).await;
    let client = open_client(&mock).await;

    let mut data = TEST_DATA.as_bytes();
    client.stor("test", &mut data).await.unwrap();
    client.rename("test", "tset").await.unwrap();

    assert_eq!(client.file_size("tset").await.unwrap(), 14);

    let mut reader = client.retr_from("tset", 5).await.unwrap();
    let mut body = String::new();
    reader.read_to_string(&mut body).await.unwrap();
    reader.close().await.unwrap();
    assert_eq!(body, "some text");

    client.delete("tset").await.unwrap();
    client.quit().await.unwrap();
}

#[tokio::test]
async fn pasv_is_used_when_epsv_is_disabled() {
    let mock = FtpMock::start(TimeProfile::NoTime).await;
    let client = FtpClient::builder(mock.addr())
        .disable_epsv()
        .connect()
        .await
        .unwrap();
    client.login("anonymous", "anonymous").await.unwrap();

    let mut data = TEST_DATA.as_bytes();
    client.stor("test", &mut data).await.unwrap();
    client.quit().await.unwrap();

    let verbs = mock.finish().await;
    assert!(verbs.contains(&"PASV".to_string()));
    assert!(!verbs.contains(&"EPSV".to_string()));
}

#[tokio::test]
async fn retrieval_from_offset_zero_equals_plain_retrieval() {
    let mock = FtpMock::start(TimeProfile::NoTime).await;
    let client = open_client(&mock).await;

    let mut data = TEST_DATA.as_bytes();
    client.stor("file", &mut data).await.unwrap();

    let mut reader = client.retr_from("file", 0).await.unwrap();
    let mut body = String::new();
    reader.read_to_string(&mut body).await.unwrap();
    reader.close().await.unwrap();
    assert_eq!(body, TEST_DATA);

    client.quit().await.unwrap();

    // Offset zero never emits REST.
    let verbs = mock.finish().await;
    assert!(!verbs.contains(&"REST".to_string()));
}

#[tokio::test]
async fn retrieval_from_the_end_yields_no_bytes() {
    let mock = FtpMock::start(TimeProfile::NoTime).await;
    let client = open_client(&mock).await;

    let mut data = TEST_DATA.as_bytes();
    client.stor("file", &mut data).await.unwrap();

    let size = client.file_size("file").await.unwrap();
    let mut reader = client.retr_from("file", size).await.unwrap();
    let mut body = Vec::new();
    reader.read_to_end(&mut body).await.unwrap();
    reader.close().await.unwrap();
    assert!(body.is_empty());

    client.quit().await.unwrap();
}

#[tokio::test]
async fn every_offset_yields_the_suffix() {
    let mock = FtpMock::start(TimeProfile::NoTime).await;
    let client = open_client(&mock).await;

    let mut data = TEST_DATA.as_bytes();
    client.stor("file", &mut data).await.unwrap();

    for offset in 0..=TEST_DATA.len() as u64 {
        let mut reader = client.retr_from("file", offset).await.unwrap();
        let mut body = String::new();
        reader.read_to_string(&mut body).await.unwrap();
        reader.close().await.unwrap();
        assert_eq!(body, &TEST_DATA[offset as usize..], "offset {}", offset);
    }

    client.quit().await.unwrap();
}

#[tokio::test]
async fn append_concatenates() {
    let mock = FtpMock::start(TimeProfile::NoTime).await;
    let client = open_client(&mock).await;

    let mut a = &b"first half, "[..];
    client.stor("file", &mut a).await.unwrap();
    let mut b = &b"second half"[..];
    client.append("file", &mut b).await.unwrap();

    let mut reader = client.retr("file").await.unwrap();
    let mut body = String::new();
    reader.read_to_string(&mut body).await.unwrap();
    reader.close().await.unwrap();
    assert_eq!(body, "first half, second half");

    client.quit().await.unwrap();
}

#[tokio::test]
async fn reader_tolerates_a_second_close() {
    let mock = FtpMock::start(TimeProfile::NoTime).await;
    let client = open_client(&mock).await;

    let mut data = TEST_DATA.as_bytes();
    client.stor("file", &mut data).await.unwrap();

    let mut reader = client.retr("file").await.unwrap();
    let mut body = Vec::new();
    reader.read_to_end(&mut body).await.unwrap();
    reader.close().await.unwrap();
    reader.close().await.unwrap();

    client.noop().await.unwrap();
    client.quit().await.unwrap();
}

#[tokio::test]
async fn second_transfer_is_rejected_off_the_wire() {
    let mock = FtpMock::start(TimeProfile::NoTime).await;
    let client = open_client(&mock).await;

    let mut data = TEST_DATA.as_bytes();
    client.stor("file", &mut data).await.unwrap();

    let mut reader = client.retr("file").await.unwrap();
    let err = client.retr("file").await.unwrap_err();
    assert!(matches!(err, FtpError::TransferInProgress));

    let mut body = Vec::new();
    reader.read_to_end(&mut body).await.unwrap();
    reader.close().await.unwrap();
    client.quit().await.unwrap();

    // The rejected call must not have touched the wire: one negotiation,
    // one RETR.
    let verbs = mock.finish().await;
    assert_eq!(verbs.iter().filter(|v| *v == "RETR").count(), 1);
    assert_eq!(verbs.iter().filter(|v| *v == "EPSV").count(), 2);
}

#[tokio::test]
async fn abandoned_reader_is_drained_before_the_next_command() {
    let mock = FtpMock::start(TimeProfile::NoTime).await;
    let client = open_client(&mock).await;

    let mut data = TEST_DATA.as_bytes();
    client.stor("file", &mut data).await.unwrap();

    let reader = client.retr("file").await.unwrap();
    drop(reader);

    // The dropped reader left a final reply in flight; the next command
    // must still see its own reply.
    client.noop().await.unwrap();
    client.quit().await.unwrap();
}

#[tokio::test]
async fn get_entry_returns_typed_facts() {
    let mock = FtpMock::start(TimeProfile::NoTime).await;
    let client = open_client(&mock).await;

    let entry = client.get_entry("magic-file").await.unwrap();
    assert_eq!(entry.name, "magic-file");
    assert_eq!(entry.kind, EntryKind::File);
    assert_eq!(entry.size, 42);
    assert_eq!(
        entry.modified,
        Some(Utc.with_ymd_and_hms(2020, 12, 13, 20, 24, 0).unwrap())
    );

    client.quit().await.unwrap();
}

#[tokio::test]
async fn size_of_missing_file_is_a_550() {
    let mock = FtpMock::start(TimeProfile::NoTime).await;
    let client = open_client(&mock).await;

    let err = client.file_size("not-found").await.unwrap_err();
    assert!(err.is_status(550), "got {:?}", err);

    // A status error leaves the session usable.
    client.noop().await.unwrap();
    client.quit().await.unwrap();
}

#[tokio::test]
async fn vsftpd_profile_cannot_set_times_by_default() {
    let mock = FtpMock::start(TimeProfile::Vsftpd).await;
    let client = open_client(&mock).await;

    assert!(client.is_get_time_supported().await);
    assert!(!client.is_set_time_supported().await);

    let when = Utc.with_ymd_and_hms(2020, 12, 13, 20, 24, 0).unwrap();
    let err = client.set_time("f", when).await.unwrap_err();
    assert!(err.is_status(500), "got {:?}", err);

    client.quit().await.unwrap();
}

#[tokio::test]
async fn vsftpd_profile_sets_times_through_mdtm_when_asked() {
    let mock = FtpMock::start(TimeProfile::Vsftpd).await;
    let client = FtpClient::builder(mock.addr())
        .writing_mdtm()
        .connect()
        .await
        .unwrap();
    client.login("anonymous", "anonymous").await.unwrap();

    assert!(client.is_set_time_supported().await);
    let when = Utc.with_ymd_and_hms(2020, 12, 13, 20, 24, 0).unwrap();
    client.set_time("f", when).await.unwrap();

    client.quit().await.unwrap();
    let verbs = mock.finish().await;
    assert!(verbs.iter().filter(|v| *v == "MDTM").count() == 1);
    assert!(!verbs.contains(&"MFMT".to_string()));
}

#[tokio::test]
async fn std_profile_reads_and_writes_times() {
    let mock = FtpMock::start(TimeProfile::StdTime).await;
    let client = open_client(&mock).await;

    assert!(client.is_get_time_supported().await);
    assert!(client.is_set_time_supported().await);

    let mtime = client.get_time("file").await.unwrap();
    assert_eq!(mtime, Utc.with_ymd_and_hms(2020, 12, 13, 20, 24, 0).unwrap());

    client.set_time("file", mtime).await.unwrap();
    client.quit().await.unwrap();

    let verbs = mock.finish().await;
    assert!(verbs.contains(&"MFMT".to_string()));
}

#[tokio::test]
async fn remove_dir_recur_on_missing_dir_keeps_the_working_directory() {
    let mock = FtpMock::start(TimeProfile::NoTime).await;
    let client = open_client(&mock).await;

    let before = client.current_dir().await.unwrap();
    let err = client.remove_dir_recur("missing-dir").await.unwrap_err();
    assert!(err.is_status(550), "got {:?}", err);
    assert_eq!(client.current_dir().await.unwrap(), before);

    client.quit().await.unwrap();
}

#[tokio::test]
async fn remove_dir_recur_walks_the_tree() {
    let mut listings = HashMap::new();
    listings.insert(
        "/testDir".to_string(),
        "type=file;size=9;modify=20201213202400; fileTest\r\ntype=dir;modify=20201213202400; anotherDir".to_string(),
    );
    listings.insert("/testDir/anotherDir".to_string(), String::new());
    let mock = FtpMock::start_with(MockConfig {
        profile: TimeProfile::NoTime,
        listings,
        ..MockConfig::default()
    })
    .await;
    let client = open_client(&mock).await;

    client.remove_dir_recur("testDir").await.unwrap();
    assert_eq!(client.current_dir().await.unwrap(), "/");

    client.quit().await.unwrap();
    let verbs = mock.finish().await;
    assert_eq!(verbs.iter().filter(|v| *v == "DELE").count(), 1);
    assert_eq!(verbs.iter().filter(|v| *v == "RMD").count(), 2);
}

#[tokio::test]
async fn default_listing_parses_the_canned_line() {
    let mock = FtpMock::start(TimeProfile::NoTime).await;
    let client = open_client(&mock).await;

    let entries = client.list(".").await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].name, "lo");
    assert_eq!(entries[0].kind, EntryKind::File);

    client.quit().await.unwrap();
    let verbs = mock.finish().await;
    assert!(verbs.contains(&"MLSD".to_string()));
}

#[tokio::test]
async fn disable_mlsd_falls_back_to_list() {
    let mock = FtpMock::start(TimeProfile::NoTime).await;
    let client = FtpClient::builder(mock.addr())
        .disable_mlsd()
        .connect()
        .await
        .unwrap();
    client.login("anonymous", "anonymous").await.unwrap();

    let entries = client.list(".").await.unwrap();
    assert_eq!(entries.len(), 1);

    client.quit().await.unwrap();
    let verbs = mock.finish().await;
    assert!(verbs.contains(&"LIST".to_string()));
    assert!(!verbs.contains(&"MLSD".to_string()));
}

#[tokio::test]
async fn name_list_returns_lines_verbatim() {
    let mock = FtpMock::start(TimeProfile::NoTime).await;
    let client = open_client(&mock).await;

    let names = client.name_list("/").await.unwrap();
    assert_eq!(names, vec!["/incoming".to_string()]);

    client.quit().await.unwrap();
}

#[tokio::test]
async fn wrong_login_is_a_status_error() {
    let mock = FtpMock::start(TimeProfile::NoTime).await;
    let client = FtpClient::dial(mock.addr()).await.unwrap();

    let err = client.login("zoo2Shia", "fei5Yix9").await.unwrap_err();
    assert!(err.is_status(530), "got {:?}", err);

    client.quit().await.unwrap();
}

#[tokio::test]
async fn logout_downgrades_not_implemented() {
    let mock = FtpMock::start(TimeProfile::NoTime).await;
    let client = open_client(&mock).await;

    // The mock implements REIN with a plain 220.
    client.logout().await.unwrap();
    client.quit().await.unwrap();
}

#[tokio::test]
async fn operations_after_quit_fail_closed() {
    let mock = FtpMock::start(TimeProfile::NoTime).await;
    let client = open_client(&mock).await;

    client.quit().await.unwrap();
    client.quit().await.unwrap();

    let err = client.noop().await.unwrap_err();
    assert!(matches!(err, FtpError::Closed));

    drop(client);
    let verbs = mock.finish().await;
    assert_eq!(verbs.iter().filter(|v| *v == "QUIT").count(), 1);
}

#[tokio::test]
async fn glob_expands_across_segments() {
    let mut listings = HashMap::new();
    listings.insert(
        "./".to_string(),
        "type=dir;modify=20201213202400; glob".to_string(),
    );
    listings.insert(
        "./glob/".to_string(),
        "type=file;size=0;modify=20201213202400; match.go".to_string(),
    );
    let mock = FtpMock::start_with(MockConfig {
        profile: TimeProfile::NoTime,
        listings,
        ..MockConfig::default()
    })
    .await;
    let client = open_client(&mock).await;

    for pattern in ["glob/match.go", "glob/mat?h.go", "glob/ma*ch.go", "**/match.go"] {
        let matched = client.glob(pattern).await.unwrap();
        assert!(
            matched.contains(&"glob/match.go".to_string()),
            "pattern {:?} matched {:?}",
            pattern,
            matched
        );
    }

    let matched = client.glob("**/*").await.unwrap();
    assert!(matched.contains(&"glob/match.go".to_string()));

    for pattern in ["no_match", "../*/no_match"] {
        assert!(client.glob(pattern).await.unwrap().is_empty(), "pattern {:?}", pattern);
    }

    let err = client.glob("[7").await.unwrap_err();
    assert!(matches!(err, FtpError::BadPattern));

    client.quit().await.unwrap();
}

#[tokio::test]
async fn advertised_features_are_queryable() {
    let mock = FtpMock::start(TimeProfile::StdTime).await;
    let client = open_client(&mock).await;

    assert_eq!(client.feature("MLST").await.as_deref(), Some("type*;size*;modify*;"));
    assert_eq!(client.feature("mdtm").await.as_deref(), Some(""));
    assert_eq!(client.feature("NOSUCH").await, None);

    client.quit().await.unwrap();
}

#[tokio::test]
async fn unparsable_listing_lines_are_skipped_not_fatal() {
    let mut listings = HashMap::new();
    listings.insert(
        ".".to_string(),
        "total 2\r\n-rw-r--r--   1 ftp ftp 42 Dec 02  2009 kept\r\nutter nonsense line".to_string(),
    );
    let mock = FtpMock::start_with(MockConfig {
        profile: TimeProfile::NoTime,
        listings,
        ..MockConfig::default()
    })
    .await;
    let client = FtpClient::builder(mock.addr())
        .disable_mlsd()
        .connect()
        .await
        .unwrap();
    client.login("anonymous", "anonymous").await.unwrap();

    let entries = client.list(".").await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].name, "kept");

    // The session survives a listing full of noise.
    client.noop().await.unwrap();
    client.quit().await.unwrap();
}

#[tokio::test]
async fn reader_reports_eof_after_close() {
    let mock = FtpMock::start(TimeProfile::NoTime).await;
    let client = open_client(&mock).await;

    let mut data = TEST_DATA.as_bytes();
    client.stor("file", &mut data).await.unwrap();

    let mut reader = client.retr("file").await.unwrap();
    let mut body = Vec::new();
    reader.read_to_end(&mut body).await.unwrap();
    reader.close().await.unwrap();

    let mut after = Vec::new();
    assert_eq!(reader.read_to_end(&mut after).await.unwrap(), 0);
    assert!(after.is_empty());

    client.quit().await.unwrap();
}

#[tokio::test]
async fn utf8_rejection_after_advertising_is_tolerated() {
    let mock = FtpMock::start_with(MockConfig {
        reject_utf8: true,
        ..MockConfig::default()
    })
    .await;

    // The dial must survive the 502 and simply run without UTF-8.
    let client = open_client(&mock).await;
    assert!(!client.is_utf8_enabled().await);
    client.noop().await.unwrap();
    client.quit().await.unwrap();
}

#[tokio::test]
async fn bogus_pasv_address_is_replaced_with_the_control_host() {
    let mock = FtpMock::start_with(MockConfig {
        bogus_pasv: true,
        ..MockConfig::default()
    })
    .await;
    let client = FtpClient::builder(mock.addr())
        .disable_epsv()
        .connect()
        .await
        .unwrap();
    client.login("anonymous", "anonymous").await.unwrap();

    // The server claims a 192.168/16 address it does not have; the
    // transfer only works because the client dials the control host.
    let mut data = TEST_DATA.as_bytes();
    client.stor("file", &mut data).await.unwrap();
    assert_eq!(client.file_size("file").await.unwrap(), TEST_DATA.len() as u64);

    client.quit().await.unwrap();
}

#[tokio::test]
async fn custom_dial_functions_carry_all_connections() {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    let mock = FtpMock::start(TimeProfile::NoTime).await;
    let dials = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&dials);
    let client = FtpClient::builder(mock.addr())
        .dial_func(move |host: &str, port: u16| {
            counter.fetch_add(1, Ordering::SeqCst);
            let host = host.to_string();
            Box::pin(async move {
                let stream = tokio::net::TcpStream::connect((host.as_str(), port)).await?;
                Ok(Box::new(stream) as libftpc::BoxStream)
            })
        })
        .connect()
        .await
        .unwrap();
    client.login("anonymous", "anonymous").await.unwrap();

    let mut data = TEST_DATA.as_bytes();
    client.stor("file", &mut data).await.unwrap();
    client.quit().await.unwrap();

    // One control connection plus one data connection.
    assert_eq!(dials.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn status_text_is_exposed() {
    assert_eq!(libftpc::status_text(libftpc::status::READY), "Service ready for new user");
    assert_eq!(libftpc::status_text(999), "Unknown status code: 999");
}
