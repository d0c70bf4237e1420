//! Determinism and round-trip tests for the descriptor format.
//!
//! The log driving these tests is produced by the capture crate's recorder,
//! the same state machine the live hooks write through, so the shapes match
//! what a real registration pass delivers.

use std::io::Write;

use regshadow_capture::{KeyRef, Recorder};
use regshadow_common::{RegistrationLog, ValueKind, ROOT_CLASSES};
use regshadow_manifest::{
    render_assembly_manifest, write_assembly_manifest, AssemblyIdentity, AssemblyVersion,
    DigestAlgo, DigestSet, ManifestBuilder, ManifestError,
};

const CLSID_ONE: &str = "{11111111-AAAA-BBBB-CCCC-000000000001}";
const CLSID_TWO: &str = "{22222222-AAAA-BBBB-CCCC-000000000002}";
const IID: &str = "{33333333-AAAA-BBBB-CCCC-000000000003}";
const TLBID: &str = "{44444444-AAAA-BBBB-CCCC-000000000004}";

fn utf16(s: &str) -> Vec<u8> {
    s.encode_utf16().chain([0]).flat_map(|u| u.to_le_bytes()).collect()
}

/// Drive the recorder the way a component's register routine would.
fn sample_log() -> RegistrationLog {
    let mut rec = Recorder::new(false);

    let clsid = rec.key_create(KeyRef::Root(ROOT_CLASSES), &format!("CLSID\\{CLSID_ONE}"));
    rec.set_value(KeyRef::Handle(clsid), None, ValueKind::String, &utf16("Demo widget"));
    let inproc = rec.key_create(KeyRef::Handle(clsid), "InprocServer32");
    rec.set_value(
        KeyRef::Handle(inproc),
        Some("ThreadingModel"),
        ValueKind::String,
        &utf16("Apartment"),
    );
    let progid_key = rec.key_create(KeyRef::Handle(clsid), "ProgID");
    rec.set_value(KeyRef::Handle(progid_key), None, ValueKind::String, &utf16("Demo.Widget.1"));
    rec.key_close(KeyRef::Handle(progid_key));
    rec.key_close(KeyRef::Handle(inproc));
    rec.key_close(KeyRef::Handle(clsid));

    let second = rec.key_create(KeyRef::Root(ROOT_CLASSES), &format!("CLSID\\{CLSID_TWO}"));
    rec.key_close(KeyRef::Handle(second));

    let iface = rec.key_create(KeyRef::Root(ROOT_CLASSES), &format!("Interface\\{IID}"));
    rec.set_value(KeyRef::Handle(iface), None, ValueKind::String, &utf16("IDemoWidget"));
    let stub = rec.key_create(KeyRef::Handle(iface), "ProxyStubClsid32");
    rec.set_value(KeyRef::Handle(stub), None, ValueKind::String, &utf16(CLSID_TWO));
    rec.key_close(KeyRef::Handle(stub));
    rec.key_close(KeyRef::Handle(iface));

    let typelib = rec.key_create(
        KeyRef::Root(ROOT_CLASSES),
        &format!("TypeLib\\{TLBID}\\1.0"),
    );
    let helpdir = rec.key_create(KeyRef::Handle(typelib), "HELPDIR");
    rec.set_value(KeyRef::Handle(helpdir), None, ValueKind::String, &utf16(""));
    rec.key_close(KeyRef::Handle(helpdir));
    rec.key_close(KeyRef::Handle(typelib));

    rec.into_log()
}

/// Declare `demo.dll` (no digests requested) and fold the sample log, the
/// same pairing the driver performs per module.
fn sample_model() -> regshadow_manifest::ManifestModel {
    let dir = tempfile::tempdir().expect("temp dir");
    let module = dir.path().join("demo.dll");
    std::fs::write(&module, b"not a real module").expect("write module");

    let mut builder = ManifestBuilder::new(AssemblyIdentity::new(
        "demo.sxs",
        AssemblyVersion::DEFAULT,
    ));
    builder.add_file(&module, &DigestSet::new()).expect("add file");
    builder.apply_log("demo.dll", &sample_log());
    builder.finalize()
}

#[test]
fn rendering_twice_is_byte_identical() {
    let model = sample_model();
    assert_eq!(render_assembly_manifest(&model), render_assembly_manifest(&model));

    // A freshly folded model from the same log renders the same bytes too.
    assert_eq!(
        render_assembly_manifest(&sample_model()),
        render_assembly_manifest(&model)
    );
}

#[test]
fn descriptor_contains_each_identifier_exactly_once() {
    let model = sample_model();
    let xml = render_assembly_manifest(&model);

    let n = model.classes.len();
    let m = model.interfaces.len();
    let k = model.typelibs.len();
    assert_eq!(xml.matches("<comClass ").count(), n);
    assert_eq!(xml.matches("<comInterfaceExternalProxyStub ").count(), m);
    assert_eq!(xml.matches("<typelib ").count(), k);
    assert_eq!((n, m, k), (2, 1, 1));

    for id in [CLSID_ONE, CLSID_TWO, IID, TLBID] {
        assert_eq!(xml.matches(id).count(), 1, "duplicate or missing {id}");
    }
}

#[test]
fn classes_sort_ascending_within_their_file() {
    let model = sample_model();
    let xml = render_assembly_manifest(&model);
    let first = xml.find(CLSID_ONE).expect("first clsid present");
    let second = xml.find(CLSID_TWO).expect("second clsid present");
    assert!(first < second);
}

#[test]
fn file_declaration_carries_requested_digests() {
    let mut file = tempfile::NamedTempFile::new().expect("temp file");
    file.write_all(b"abc").expect("write");

    let mut builder = ManifestBuilder::new(AssemblyIdentity::new(
        "demo.sxs",
        AssemblyVersion::DEFAULT,
    ));
    let algos: DigestSet = [DigestAlgo::Size, DigestAlgo::Sha1, DigestAlgo::Sha256]
        .into_iter()
        .collect();
    builder.add_file(file.path(), &algos).expect("add file");
    let xml = render_assembly_manifest(&builder.finalize());

    assert!(xml.contains("size=\"3\""));
    assert!(xml.contains("sha1=\"a9993e364706816aba3e25717850c26c9cd0d89d\""));
    assert!(xml.contains(
        "sha256=\"ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad\""
    ));
}

#[test]
fn written_manifest_matches_rendered_bytes() {
    let model = sample_model();
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("demo.sxs.manifest");

    write_assembly_manifest(&model, &path).expect("write");
    let on_disk = std::fs::read_to_string(&path).expect("read back");
    assert_eq!(on_disk, render_assembly_manifest(&model));

    // No temp residue after promotion.
    let leftovers: Vec<_> = std::fs::read_dir(dir.path())
        .expect("list")
        .map(|e| e.expect("entry").file_name())
        .collect();
    assert_eq!(leftovers, vec![std::ffi::OsString::from("demo.sxs.manifest")]);
}

#[test]
fn failed_write_leaves_no_partial_file() {
    let model = sample_model();
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("missing-subdir").join("demo.sxs.manifest");

    let err = write_assembly_manifest(&model, &path).unwrap_err();
    assert!(matches!(err, ManifestError::Write { .. }));
    assert!(!path.exists());
}
