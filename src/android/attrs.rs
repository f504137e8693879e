//! Static tables for framework attributes: id → name for the resource map fallback, and the
//! integer encodings of a handful of manifest attributes.

use bitflags::bitflags;
use once_cell::sync::Lazy;
use std::collections::HashMap;

static SYSTEM_ATTRIBUTES: Lazy<HashMap<u32, &'static str>> = Lazy::new(|| {
    [
        (0x0101_0000, "theme"),
        (0x0101_0001, "label"),
        (0x0101_0002, "icon"),
        (0x0101_0003, "name"),
        (0x0101_0004, "manageSpaceActivity"),
        (0x0101_0005, "allowClearUserData"),
        (0x0101_0006, "permission"),
        (0x0101_0007, "readPermission"),
        (0x0101_0008, "writePermission"),
        (0x0101_0009, "protectionLevel"),
        (0x0101_000a, "permissionGroup"),
        (0x0101_000b, "sharedUserId"),
        (0x0101_000c, "hasCode"),
        (0x0101_000d, "persistent"),
        (0x0101_000e, "enabled"),
        (0x0101_000f, "debuggable"),
        (0x0101_0010, "exported"),
        (0x0101_0011, "process"),
        (0x0101_0012, "taskAffinity"),
        (0x0101_0013, "multiprocess"),
        (0x0101_0014, "finishOnTaskLaunch"),
        (0x0101_0015, "clearTaskOnLaunch"),
        (0x0101_0016, "stateNotNeeded"),
        (0x0101_0017, "excludeFromRecents"),
        (0x0101_0018, "authorities"),
        (0x0101_0019, "syncable"),
        (0x0101_001a, "initOrder"),
        (0x0101_001b, "grantUriPermissions"),
        (0x0101_001c, "priority"),
        (0x0101_001d, "launchMode"),
        (0x0101_001e, "screenOrientation"),
        (0x0101_001f, "configChanges"),
        (0x0101_0020, "description"),
        (0x0101_0021, "targetPackage"),
        (0x0101_0022, "handleProfiling"),
        (0x0101_0023, "functionalTest"),
        (0x0101_0024, "value"),
        (0x0101_0025, "resource"),
        (0x0101_0026, "mimeType"),
        (0x0101_0027, "scheme"),
        (0x0101_0028, "host"),
        (0x0101_0029, "port"),
        (0x0101_002a, "path"),
        (0x0101_002b, "pathPrefix"),
        (0x0101_002c, "pathPattern"),
        (0x0101_002d, "action"),
        (0x0101_002e, "data"),
        (0x0101_002f, "targetClass"),
        (0x0101_0199, "drawable"),
        (0x0101_020c, "minSdkVersion"),
        (0x0101_021b, "versionCode"),
        (0x0101_021c, "versionName"),
        (0x0101_022b, "windowSoftInputMode"),
        (0x0101_026c, "anyDensity"),
        (0x0101_0261, "sharedUserLabel"),
        (0x0101_0270, "targetSdkVersion"),
        (0x0101_0271, "maxSdkVersion"),
        (0x0101_0272, "testOnly"),
        (0x0101_0280, "allowBackup"),
        (0x0101_0281, "glEsVersion"),
        (0x0101_0284, "smallScreens"),
        (0x0101_0285, "normalScreens"),
        (0x0101_0286, "largeScreens"),
        (0x0101_028e, "required"),
        (0x0101_02b7, "installLocation"),
        (0x0101_02b8, "vmSafeMode"),
        (0x0101_02bf, "xlargeScreens"),
        (0x0101_02d3, "hardwareAccelerated"),
        (0x0101_035a, "largeHeap"),
        (0x0101_03af, "supportsRtl"),
        (0x0101_04ea, "extractNativeLibs"),
        (0x0101_04ec, "usesCleartextTraffic"),
        (0x0101_0527, "networkSecurityConfig"),
        (0x0101_052c, "roundIcon"),
        (0x0101_0572, "compileSdkVersion"),
        (0x0101_0573, "compileSdkVersionCodename"),
    ]
    .into_iter()
    .collect()
});

/// Name of a framework attribute id, if known.
pub fn system_attribute_name(id: u32) -> Option<&'static str> {
    SYSTEM_ATTRIBUTES.get(&id).copied()
}

bitflags! {
    /// `android:configChanges` bits.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct ConfigChanges: u32 {
        const MCC = 0x0001;
        const MNC = 0x0002;
        const LOCALE = 0x0004;
        const TOUCHSCREEN = 0x0008;
        const KEYBOARD = 0x0010;
        const KEYBOARD_HIDDEN = 0x0020;
        const NAVIGATION = 0x0040;
        const ORIENTATION = 0x0080;
        const SCREEN_LAYOUT = 0x0100;
        const UI_MODE = 0x0200;
        const SCREEN_SIZE = 0x0400;
        const SMALLEST_SCREEN_SIZE = 0x0800;
        const DENSITY = 0x1000;
        const LAYOUT_DIRECTION = 0x2000;
        const COLOR_MODE = 0x4000;
        const GRAMMATICAL_GENDER = 0x8000;
        const FONT_WEIGHT_ADJUSTMENT = 0x1000_0000;
        const FONT_SCALE = 0x4000_0000;
    }
}

const CONFIG_CHANGE_TOKENS: &[(ConfigChanges, &str)] = &[
    (ConfigChanges::MCC, "mcc"),
    (ConfigChanges::MNC, "mnc"),
    (ConfigChanges::LOCALE, "locale"),
    (ConfigChanges::TOUCHSCREEN, "touchscreen"),
    (ConfigChanges::KEYBOARD, "keyboard"),
    (ConfigChanges::KEYBOARD_HIDDEN, "keyboardHidden"),
    (ConfigChanges::NAVIGATION, "navigation"),
    (ConfigChanges::ORIENTATION, "orientation"),
    (ConfigChanges::SCREEN_LAYOUT, "screenLayout"),
    (ConfigChanges::UI_MODE, "uiMode"),
    (ConfigChanges::SCREEN_SIZE, "screenSize"),
    (ConfigChanges::SMALLEST_SCREEN_SIZE, "smallestScreenSize"),
    (ConfigChanges::DENSITY, "density"),
    (ConfigChanges::LAYOUT_DIRECTION, "layoutDirection"),
    (ConfigChanges::COLOR_MODE, "colorMode"),
    (ConfigChanges::GRAMMATICAL_GENDER, "grammaticalGender"),
    (ConfigChanges::FONT_WEIGHT_ADJUSTMENT, "fontWeightAdjustment"),
    (ConfigChanges::FONT_SCALE, "fontScale"),
];

/// Map the integer encoding of one of the known enum/flag attributes to its XML token.
/// Returns `None` for attributes that keep their numeric rendering.
pub fn attribute_token(name: &str, value: u32) -> Option<String> {
    let token = match name {
        "screenOrientation" => screen_orientation(value),
        "configChanges" => config_changes(value),
        "windowSoftInputMode" => window_soft_input_mode(value),
        "launchMode" => launch_mode(value),
        "installLocation" => install_location(value),
        "protectionLevel" => protection_level(value),
        _ => return None,
    };
    Some(token)
}

fn screen_orientation(value: u32) -> String {
    let token = match value as i32 {
        -1 => "unspecified",
        0 => "landscape",
        1 => "portrait",
        2 => "user",
        3 => "behind",
        4 => "sensor",
        5 => "nosensor",
        6 => "sensorLandscape",
        7 => "sensorPortrait",
        8 => "reverseLandscape",
        9 => "reversePortrait",
        10 => "fullSensor",
        11 => "userLandscape",
        12 => "userPortrait",
        13 => "fullUser",
        14 => "locked",
        other => return format!("ScreenOrientation:{other}"),
    };
    token.to_string()
}

fn config_changes(value: u32) -> String {
    let flags = ConfigChanges::from_bits_retain(value);
    let mut tokens: Vec<String> = CONFIG_CHANGE_TOKENS
        .iter()
        .filter(|(flag, _)| flags.contains(*flag))
        .map(|(_, token)| token.to_string())
        .collect();
    let unknown = value & !ConfigChanges::all().bits();
    if unknown != 0 {
        tokens.push(format!("0x{unknown:x}"));
    }
    tokens.join("|")
}

fn window_soft_input_mode(value: u32) -> String {
    let adjust = match value & 0xf0 {
        0x00 => "adjustUnspecified",
        0x10 => "adjustResize",
        0x20 => "adjustPan",
        0x30 => "adjustNothing",
        _ => "",
    };
    let state = match value & 0x0f {
        0 => "stateUnspecified",
        1 => "stateUnchanged",
        2 => "stateHidden",
        3 => "stateAlwaysHidden",
        4 => "stateVisible",
        5 => "stateAlwaysVisible",
        _ => "",
    };
    [state, adjust]
        .iter()
        .filter(|token| !token.is_empty())
        .copied()
        .collect::<Vec<_>>()
        .join("|")
}

fn launch_mode(value: u32) -> String {
    match value {
        0 => "standard".to_string(),
        1 => "singleTop".to_string(),
        2 => "singleTask".to_string(),
        3 => "singleInstance".to_string(),
        4 => "singleInstancePerTask".to_string(),
        other => format!("LaunchMode:{other}"),
    }
}

fn install_location(value: u32) -> String {
    match value {
        0 => "auto".to_string(),
        1 => "internalOnly".to_string(),
        2 => "preferExternal".to_string(),
        other => format!("installLocation:{other:x}"),
    }
}

fn protection_level(value: u32) -> String {
    let base = match value & 0xf {
        0 => "normal".to_string(),
        1 => "dangerous".to_string(),
        2 => "signature".to_string(),
        3 => "signatureOrSystem".to_string(),
        other => format!("protectionLevel:{other:x}"),
    };
    let flag_tokens = [
        (0x10, "privileged"),
        (0x20, "development"),
        (0x40, "appop"),
        (0x80, "pre23"),
        (0x100, "installer"),
        (0x200, "verifier"),
        (0x400, "preinstalled"),
        (0x800, "setup"),
        (0x1000, "instant"),
        (0x2000, "runtime"),
        (0x4000, "oem"),
        (0x8000, "vendorPrivileged"),
    ];
    let mut tokens = vec![base];
    tokens.extend(
        flag_tokens
            .iter()
            .filter(|(bit, _)| value & bit != 0)
            .map(|(_, token)| token.to_string()),
    );
    tokens.join("|")
}
