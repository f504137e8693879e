//! End-to-end runs over complete in-memory and on-disk APKs.

use crate::android::binary_xml::ANDROID_NAMESPACE_URI;
use crate::android::config::{DENSITY_DEFAULT, DENSITY_XXHIGH};
use crate::android::res_value::{TYPE_INT_BOOLEAN, TYPE_INT_DEC, TYPE_STRING};
use crate::apk::{ApkParser, ParseOptions, MANIFEST_PATH, RESOURCE_TABLE_PATH};
use crate::error::ErrorKind;
use crate::signing::block::SIGNATURE_SCHEME_V3_BLOCK_ID;
use crate::signing::SignatureScheme;
use crate::tests::fixtures::{
    signed_data, signer_block_value, signing_block, test_certificate, with_signing_block,
    zip_archive, ArscBuilder, AttrValue, SignerRef, TypeConfig, XmlBuilder,
};
use crate::{ApkFile, ApkIcon, CertificateBackend, IconPath, Locale};
use std::fs;

const ATTR_LABEL: u32 = 0x0101_0001;
const ATTR_ICON: u32 = 0x0101_0002;
const ATTR_NAME: u32 = 0x0101_0003;
const ATTR_VERSION_CODE: u32 = 0x0101_021b;
const ATTR_VERSION_NAME: u32 = 0x0101_021c;
const ATTR_MIN_SDK: u32 = 0x0101_020c;
const ATTR_TARGET_SDK: u32 = 0x0101_0270;
const ATTR_DEBUGGABLE: u32 = 0x0101_000f;

/// Resource ids as laid out by the table below: `string` is type 1, `mipmap` type 2.
const STRING_APP_NAME: u32 = 0x7f01_0000;
const MIPMAP_LAUNCHER: u32 = 0x7f02_0000;

fn table() -> Vec<u8> {
    let mut arsc = ArscBuilder::new("org.example.notes");
    let name = arsc.add_global_string("Notes");
    let name_de = arsc.add_global_string("Notizen");
    let icon = arsc.add_global_string("res/mipmap/ic_launcher.png");
    let icon_xx = arsc.add_global_string("res/mipmap-xxhdpi/ic_launcher.png");
    arsc.add_entry("string", TypeConfig::default(), "app_name", TYPE_STRING, name);
    arsc.add_entry("string", TypeConfig::locale("de", ""), "app_name", TYPE_STRING, name_de);
    arsc.add_entry("mipmap", TypeConfig::default(), "ic_launcher", TYPE_STRING, icon);
    arsc.add_entry("mipmap", TypeConfig::density(DENSITY_XXHIGH), "ic_launcher", TYPE_STRING, icon_xx);
    arsc.add_entry("integer", TypeConfig::default(), "answer", TYPE_INT_DEC, 42);
    arsc.build()
}

fn manifest() -> Vec<u8> {
    let mut xml = XmlBuilder::new();
    xml.start_namespace("android", ANDROID_NAMESPACE_URI);
    xml.start_element(
        "manifest",
        vec![
            XmlBuilder::android_attr("versionCode", ATTR_VERSION_CODE, AttrValue::Int(TYPE_INT_DEC, 7)),
            XmlBuilder::android_attr("versionName", ATTR_VERSION_NAME, AttrValue::Str("2.1".into())),
            XmlBuilder::attr(None, "package", None, AttrValue::Str("org.example.notes".into())),
        ],
    );
    xml.start_element(
        "uses-sdk",
        vec![
            XmlBuilder::android_attr("minSdkVersion", ATTR_MIN_SDK, AttrValue::Int(TYPE_INT_DEC, 24)),
            XmlBuilder::android_attr("targetSdkVersion", ATTR_TARGET_SDK, AttrValue::Int(TYPE_INT_DEC, 34)),
        ],
    );
    xml.end_element("uses-sdk");
    xml.start_element(
        "uses-permission",
        vec![XmlBuilder::android_attr(
            "name",
            ATTR_NAME,
            AttrValue::Str("android.permission.INTERNET".into()),
        )],
    );
    xml.end_element("uses-permission");
    xml.start_element(
        "application",
        vec![
            XmlBuilder::android_attr("label", ATTR_LABEL, AttrValue::Ref(STRING_APP_NAME)),
            XmlBuilder::android_attr("icon", ATTR_ICON, AttrValue::Ref(MIPMAP_LAUNCHER)),
            XmlBuilder::android_attr("debuggable", ATTR_DEBUGGABLE, AttrValue::Int(TYPE_INT_BOOLEAN, 0)),
        ],
    );
    xml.end_element("application");
    xml.end_element("manifest");
    xml.end_namespace("android", ANDROID_NAMESPACE_URI);
    xml.build()
}

fn signed_apk() -> (Vec<u8>, Vec<u8>) {
    let cert = test_certificate("Notes Release", 0x21);
    let pkcs7 = signed_data(&[&cert], &[(&cert, SignerRef::IssuerAndSerial)]);
    let (table, manifest) = (table(), manifest());
    let zip = zip_archive(&[
        (MANIFEST_PATH, manifest.as_slice()),
        (RESOURCE_TABLE_PATH, table.as_slice()),
        ("res/mipmap/ic_launcher.png", &b"\x89PNG default"[..]),
        ("res/mipmap-xxhdpi/ic_launcher.png", &b"\x89PNG xxhdpi"[..]),
        ("META-INF/NOTES.RSA", pkcs7.as_slice()),
    ]);
    let block = signing_block(&[(
        SIGNATURE_SCHEME_V3_BLOCK_ID,
        signer_block_value(&[cert.der.clone()], Some((24, 0x7fff_ffff))),
    )]);
    (with_signing_block(&zip, &block), cert.der)
}

#[test]
fn reads_a_complete_apk_from_disk() {
    let (raw, cert_der) = signed_apk();
    let path = std::env::temp_dir().join(format!("apkmeta-scenario-{}.apk", std::process::id()));
    fs::write(&path, &raw).unwrap();
    let opened = ApkParser::open(&path);
    fs::remove_file(&path).unwrap();
    let apk = opened.unwrap();

    let meta = apk.apk_meta().unwrap();
    assert_eq!(meta.package_name.as_deref(), Some("org.example.notes"));
    assert_eq!(meta.version_name.as_deref(), Some("2.1"));
    assert_eq!(meta.version_code, 7);
    assert_eq!(meta.min_sdk_version.as_deref(), Some("24"));
    assert_eq!(meta.target_sdk_version.as_deref(), Some("34"));
    assert_eq!(meta.label.as_deref(), Some("Notes"));
    assert_eq!(meta.icon.as_deref(), Some("res/mipmap/ic_launcher.png"));
    assert!(!meta.debuggable);
    assert_eq!(meta.uses_permissions, vec!["android.permission.INTERNET"]);

    let xml = apk.manifest_xml().unwrap();
    assert!(xml.contains("xmlns:android=\"http://schemas.android.com/apk/res/android\""));
    assert!(xml.contains("android:versionName=\"2.1\""));

    assert_eq!(
        apk.icon_paths().unwrap(),
        &[
            IconPath {
                path: "res/mipmap/ic_launcher.png".into(),
                density: DENSITY_DEFAULT,
            },
            IconPath {
                path: "res/mipmap-xxhdpi/ic_launcher.png".into(),
                density: DENSITY_XXHIGH,
            },
        ]
    );
    let icons = apk.icons().unwrap();
    match icons[1].as_ref().unwrap() {
        ApkIcon::Raster { data, .. } => assert_eq!(data, b"\x89PNG xxhdpi"),
        other => panic!("expected a raster icon, got {other:?}"),
    }

    let signers = apk.signers().unwrap();
    assert_eq!(signers.len(), 1);
    assert_eq!(signers[0].path, "META-INF/NOTES.RSA");
    assert_eq!(signers[0].certificates[0].data, cert_der);

    let v3 = apk.v2_signers().unwrap();
    assert_eq!(v3.len(), 1);
    assert_eq!(v3[0].scheme, SignatureScheme::V3);
    assert_eq!(v3[0].certificates, signers[0].certificates);
}

#[test]
fn preferred_locale_from_options() {
    let (raw, _) = signed_apk();
    let options = ParseOptions::default()
        .with_preferred_locale(Locale::new("de", "AT"))
        .with_certificate_backend(CertificateBackend::X509);
    let mut apk = ApkParser::with_options(ApkFile::from_bytes(raw).unwrap(), options);
    assert_eq!(apk.apk_meta().unwrap().label.as_deref(), Some("Notizen"));
    assert_eq!(apk.signers().unwrap()[0].certificates[0].sign_algorithm, "SHA1WITHRSA");

    apk.set_preferred_locale(Locale::new("fr", "FR"));
    assert_eq!(apk.apk_meta().unwrap().label.as_deref(), Some("Notes"));
    assert!(apk.locales().unwrap().contains(&Locale::new("de", "")));
}

#[test]
fn resource_values_through_the_facade() {
    let (raw, _) = signed_apk();
    let apk = ApkParser::new(ApkFile::from_bytes(raw).unwrap());
    let table = apk.resource_table().unwrap();
    let answer = table.get_resources_by_id(0x7f03_0000).unwrap();
    assert_eq!(answer.len(), 1);
    let value = answer[0].value().unwrap();
    assert_eq!(table.render_value(value, Some(&Locale::any())), "42");
}

#[test]
fn truncated_archive_is_malformed_container() {
    let (raw, _) = signed_apk();
    let err = ApkFile::from_bytes(raw[..raw.len() / 2].to_vec()).err().unwrap();
    assert_eq!(err.kind(), ErrorKind::MalformedContainer);
}
