mod common;

use std::fs;
use std::io::Write;

use chrono::{DateTime, Duration, Utc};

use chdo::dictionary::{Classification, DictionaryCache, JsonDictionaryParser, ParserRegistry};
use chdo::sfdu::{read_sfdus, ChdoSfdu, FieldValue, ReadState, SfduStream};
use chdo::timecode::{Sclk, SclkFormat};
use chdo::{classify_all, evaluate_properties, Error};

use common::{dictionary, fixture_path, sfdu, with_label, FULL_BODY, SHORT_BODY};

#[test]
fn two_chdo_sfdu() {
    let config = dictionary();
    let mut session = ChdoSfdu::new(&config);
    session.decode(&sfdu(SHORT_BODY)).unwrap();

    assert_eq!(session.state(), ReadState::Complete);
    let chdos = session.chdos();
    assert_eq!(chdos.len(), 2);
    assert_eq!(chdos[0].chdo_type(), 2);
    assert_eq!(chdos[0].unsigned_int("format_code").unwrap(), 3);

    let data = session.data_chdo().unwrap();
    assert_eq!(data.chdo_type(), 10);
    assert_eq!(data.length(), 2);
    assert_eq!(data.bytes_without_header(), &[0xca, 0xfe]);
}

#[test]
fn full_sfdu_fields() {
    let config = dictionary();
    let mut session = ChdoSfdu::new(&config);
    session.decode(&sfdu(FULL_BODY)).unwrap();

    let types: Vec<u16> = session.chdos().iter().map(|c| c.chdo_type()).collect();
    assert_eq!(types, vec![1, 2, 3, 10]);
    assert!(session
        .chdo_by_classification(Classification::Aggregation)
        .unwrap()
        .bytes_without_header()
        .is_empty());
    assert_eq!(session.spacecraft_id().unwrap(), Some(32));

    let secondary = session.chdo_by_type(3).unwrap();
    let expected_ert: DateTime<Utc> = "2024-10-04T01:00:00Z".parse::<DateTime<Utc>>().unwrap()
        + Duration::nanoseconds(500);
    assert_eq!(secondary.date("ert").unwrap(), expected_ert);
    assert_eq!(secondary.unsigned_int("virtual_channel").unwrap(), 5);
    assert_eq!(secondary.unsigned_int("dss_id").unwrap(), 14);
    assert_eq!(
        secondary.sclk("sclk", config.sclk_format()).unwrap(),
        Sclk::new(0x1234_5678, 0x9a)
    );
    assert!((secondary.floating_point("bit_rate").unwrap() - 1200.0).abs() < f64::EPSILON);
    assert_eq!(secondary.string("facility").unwrap(), "DS14");
    assert_eq!(secondary.signed_int("frame_quality").unwrap(), -1);
    assert!(session.boolean("ert_extended_resolution").unwrap());

    assert_eq!(
        secondary.value("sclk", &SclkFormat::default()).unwrap(),
        FieldValue::Sclk(Sclk::new(0x1234_5678, 0x9a))
    );
    assert_eq!(
        session.data_chdo().unwrap().bytes_without_header(),
        hex::decode("deadbeef").unwrap()
    );
}

#[test]
fn overshoot_is_malformed_and_clears_session() {
    let config = dictionary();
    let mut session = ChdoSfdu::new(&config);
    session.decode(&sfdu(SHORT_BODY)).unwrap();

    // data CHDO declares 3 payload bytes, but only 2 remain
    let err = session.decode(&sfdu("0002000401020003000a0003cafe")).unwrap_err();
    assert!(matches!(err, Error::MalformedSfdu(_)), "got {err:?}");
    assert_eq!(session.state(), ReadState::Seeking);
    assert!(session.label().is_none());
    assert!(session.chdos().is_empty());
    assert!(session.data_chdo().is_none());
}

#[test]
fn unknown_chdo_type_aborts_read() {
    let config = dictionary();
    let mut session = ChdoSfdu::new(&config);
    let err = session.decode(&sfdu("00020004010200030063000100")).unwrap_err();
    assert!(matches!(err, Error::UnknownChdo(99)), "got {err:?}");
    assert!(session.chdos().is_empty());
}

#[test]
fn payload_shorter_than_definition() {
    let config = dictionary();
    let mut session = ChdoSfdu::new(&config);
    let err = session.decode(&sfdu("00020002010200000a0000")).unwrap_err();
    assert!(matches!(err, Error::MalformedSfdu(_)), "got {err:?}");
}

#[test]
fn properties() {
    let config = dictionary();
    let mut session = ChdoSfdu::new(&config);
    session.decode(&sfdu(FULL_BODY)).unwrap();

    let names = [
        "is_telemetry",
        "from_canberra",
        "is_voyager_2",
        "good_quality",
        "received_at_start",
        "at_sclk",
        "checksum_ok",
    ];
    let values = evaluate_properties(&config, &names, &session).unwrap();
    assert_eq!(values["is_telemetry"], true);
    // dss_id is 14, but the facility condition holds
    assert_eq!(values["from_canberra"], true);
    assert_eq!(values["is_voyager_2"], true);
    assert_eq!(values["good_quality"], false);
    assert_eq!(values["received_at_start"], true);
    assert_eq!(values["at_sclk"], true);
    // no tertiary CHDO
    assert_eq!(values["checksum_ok"], false);

    let err = session.evaluate("nope").unwrap_err();
    assert!(matches!(err, Error::UnknownProperty(_)), "got {err:?}");
}

#[test]
fn binary_field_condition_is_unsupported() {
    let config = dictionary();
    let mut session = ChdoSfdu::new(&config);
    session
        .decode(&sfdu("000200040102000300040002beef000a0000"))
        .unwrap();

    let err = session.evaluate("checksum_ok").unwrap_err();
    assert!(matches!(err, Error::UnsupportedOperation(_)), "got {err:?}");
}

#[test]
fn absent_chdo_type_is_false() {
    let config = dictionary();
    let mut session = ChdoSfdu::new(&config);
    session.decode(&sfdu(SHORT_BODY)).unwrap();

    assert!(!session.evaluate("from_canberra").unwrap());
    assert!(session.evaluate("is_telemetry").unwrap());
}

#[test]
fn read_stream_from_file() {
    let config = dictionary();
    let tmpdir = tempfile::tempdir().unwrap();
    let path = tmpdir.path().join("sfdus.dat");
    {
        let mut file = fs::File::create(&path).unwrap();
        file.write_all(&sfdu(FULL_BODY)).unwrap();
        file.write_all(b"\x00\x00garbage").unwrap();
        file.write_all(&sfdu(SHORT_BODY)).unwrap();
        file.write_all(&sfdu("0063000100")).unwrap();
        file.write_all(&sfdu(FULL_BODY)).unwrap();
    }

    let results: Vec<chdo::Result<ChdoSfdu>> =
        read_sfdus(fs::File::open(&path).unwrap(), &config).collect();
    assert_eq!(results.len(), 4);
    assert!(matches!(results[2], Err(Error::UnknownChdo(99))));

    let sessions: Vec<ChdoSfdu> = results.into_iter().filter_map(Result::ok).collect();
    assert_eq!(sessions.len(), 3);
    let classified: Vec<bool> = classify_all(&config, "is_voyager_2", &sessions)
        .into_iter()
        .map(Result::unwrap)
        .collect();
    assert_eq!(classified, vec![true, false, true]);
}

#[test]
fn header_only_then_full_read() {
    let config = dictionary();
    let mut dat = sfdu(SHORT_BODY);
    dat.extend(sfdu(FULL_BODY));
    let mut stream = SfduStream::new(&dat[..]);
    let mut session = ChdoSfdu::new(&config);

    let label = session.load_header_only(&mut stream).unwrap();
    assert_eq!(label.id.control_authority_id, "NJPL");
    assert_eq!(label.length, 14);

    // the first body is skipped by the label scan of the next read
    session.read_sfdu(&mut stream).unwrap();
    assert_eq!(session.chdos().len(), 4);
}

#[test]
fn truncated_stream_ends_iteration() {
    let config = dictionary();
    let mut dat = sfdu(SHORT_BODY);
    dat.extend(&with_label(&[0u8; 40])[..30]);

    let results: Vec<_> = read_sfdus(&dat[..], &config).collect();
    assert_eq!(results.len(), 1);
    assert!(results[0].is_ok());
}

#[test]
fn dictionary_cache_and_registry() {
    let registry = ParserRegistry::default();
    let parser = registry.resolve("json").unwrap();
    let mut cache = DictionaryCache::default();

    let config = cache
        .load(parser.as_ref(), &fixture_path("dictionary.json"))
        .unwrap();
    assert_eq!(config.version(), "7.3");
    assert!(config.is_control_authority("CCSD"));
    assert_eq!(cache.current().unwrap().version(), "7.3");

    // sessions may borrow a cached dictionary
    let mut session = ChdoSfdu::new(&config);
    session.decode(&sfdu(SHORT_BODY)).unwrap();
    assert!(session.evaluate("is_telemetry").unwrap());
}

#[test]
fn invalid_dictionary() {
    let doc = r#"{
        "version": "1",
        "control_authority_ids": ["NJPL"],
        "chdos": [
            {"type": 2, "name": "p", "classification": "primary", "byte_size": 1,
             "fields": [{"id": "x", "byte_offset": 0, "bit_offset": 4, "bit_length": 8,
                         "format": "unsigned_integer"}]}
        ]
    }"#;
    let err = JsonDictionaryParser::parse_str(doc).unwrap_err();
    assert!(matches!(err, Error::Config(_)), "got {err:?}");
}
