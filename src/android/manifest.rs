//! Collects APK metadata from the manifest's binary XML event stream.

use crate::android::binary_xml::{XmlEndElement, XmlStartElement, XmlVisitor};
use crate::android::config::{Locale, DENSITY_DEFAULT};
use crate::android::resource_table::ResourceTable;
use log::warn;
use serde::Serialize;

/// OpenGL ES version required by a `uses-feature` element.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct GlEsVersion {
    pub major: u32,
    pub minor: u32,
    pub required: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct UseFeature {
    pub name: Option<String>,
    pub required: bool,
}

/// A permission declared by the app (`<permission>`).
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Permission {
    pub name: Option<String>,
    pub label: Option<String>,
    pub icon: Option<String>,
    pub description: Option<String>,
    pub group: Option<String>,
    pub protection_level: Option<String>,
}

/// A configuration-specific icon file path.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct IconPath {
    pub path: String,
    pub density: u16,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ApkMeta {
    pub package_name: Option<String>,
    pub label: Option<String>,
    pub icon: Option<String>,
    pub version_name: Option<String>,
    pub version_code: i64,
    pub revision_code: Option<i64>,
    pub shared_user_id: Option<String>,
    pub shared_user_label: Option<String>,
    pub split: Option<String>,
    pub config_for_split: Option<String>,
    pub is_feature_split: bool,
    pub is_split_required: bool,
    pub isolated_splits: bool,
    pub install_location: Option<String>,
    pub min_sdk_version: Option<String>,
    pub target_sdk_version: Option<String>,
    pub max_sdk_version: Option<String>,
    pub compile_sdk_version: Option<String>,
    pub compile_sdk_version_codename: Option<String>,
    pub platform_build_version_code: Option<String>,
    pub platform_build_version_name: Option<String>,
    pub gl_es_version: Option<GlEsVersion>,
    pub any_density: bool,
    pub small_screens: bool,
    pub normal_screens: bool,
    pub large_screens: bool,
    pub debuggable: bool,
    pub uses_permissions: Vec<String>,
    pub uses_features: Vec<UseFeature>,
    pub permissions: Vec<Permission>,
}

/// Fills an [`ApkMeta`] and the application icon candidates while the manifest streams by.
pub struct ApkMetaTranslator<'a> {
    table: &'a ResourceTable,
    locale: Option<&'a Locale>,
    meta: ApkMeta,
    icon_paths: Vec<IconPath>,
}

fn owned(value: Option<&str>) -> Option<String> {
    value.map(str::to_string)
}

impl<'a> ApkMetaTranslator<'a> {
    pub fn new(table: &'a ResourceTable, locale: Option<&'a Locale>) -> Self {
        ApkMetaTranslator {
            table,
            locale,
            meta: ApkMeta::default(),
            icon_paths: Vec::new(),
        }
    }

    pub fn meta(&self) -> &ApkMeta {
        &self.meta
    }

    pub fn icon_paths(&self) -> &[IconPath] {
        &self.icon_paths
    }

    pub fn into_parts(self) -> (ApkMeta, Vec<IconPath>) {
        (self.meta, self.icon_paths)
    }

    fn on_manifest(&mut self, element: &XmlStartElement) {
        let meta = &mut self.meta;
        meta.package_name = owned(element.get_string("package"));
        meta.version_name = owned(element.get_string("versionName"));
        meta.revision_code = element.get_i64("revisionCode");
        meta.shared_user_id = owned(element.get_string("sharedUserId"));
        meta.shared_user_label = owned(element.get_string("sharedUserLabel"));
        meta.split = owned(element.get_string("split"));
        meta.config_for_split = owned(element.get_string("configForSplit"));
        meta.is_feature_split = element.get_bool("isFeatureSplit", false);
        meta.is_split_required = element.get_bool("isSplitRequired", false);
        meta.isolated_splits = element.get_bool("isolatedSplits", false);
        meta.install_location = owned(element.get_string("installLocation"));
        meta.compile_sdk_version = owned(element.get_string("compileSdkVersion"));
        meta.compile_sdk_version_codename =
            owned(element.get_string("compileSdkVersionCodename"));
        meta.platform_build_version_code = owned(element.get_string("platformBuildVersionCode"));
        meta.platform_build_version_name = owned(element.get_string("platformBuildVersionName"));

        let minor = element.get_i64("versionCode").unwrap_or(0) & 0xffff_ffff;
        let major = element.get_i64("versionCodeMajor").unwrap_or(0) & 0xffff_ffff;
        meta.version_code = (major << 32) | minor;
    }

    /// Split attributes may sit on `<application>` instead; `<manifest>` wins when both do.
    fn fill_split_fields(&mut self, element: &XmlStartElement) {
        let meta = &mut self.meta;
        if meta.split.is_none() {
            meta.split = owned(element.get_string("split"));
        }
        if meta.config_for_split.is_none() {
            meta.config_for_split = owned(element.get_string("configForSplit"));
        }
        meta.is_feature_split = meta.is_feature_split || element.get_bool("isFeatureSplit", false);
        meta.is_split_required =
            meta.is_split_required || element.get_bool("isSplitRequired", false);
        meta.isolated_splits = meta.isolated_splits || element.get_bool("isolatedSplits", false);
    }

    /// An icon that does not resolve through the table is used as a path as is.
    fn literal_icon(&mut self, value: &str) {
        self.meta.icon = Some(value.to_string());
        self.icon_paths.push(IconPath {
            path: value.to_string(),
            density: DENSITY_DEFAULT,
        });
    }

    fn on_application(&mut self, element: &XmlStartElement) {
        self.meta.debuggable = element.get_bool("debuggable", false);
        if let Some(label) = element.get_string("label") {
            self.meta.label = Some(label.to_string());
        }
        self.fill_split_fields(element);
        let icon = match element.attribute("icon") {
            Some(icon) => icon,
            None => return,
        };
        let reference = icon.typed_value.as_ref().and_then(|value| value.reference_id());
        let id = match reference {
            Some(id) => id,
            None => {
                self.literal_icon(&icon.value);
                return;
            }
        };
        let resources = match self.table.get_resources_by_id(id) {
            Ok(resources) => resources,
            Err(err) => {
                warn!("could not resolve application icon 0x{id:08x}: {err}");
                self.literal_icon(&icon.value);
                return;
            }
        };
        let mut selected: Option<String> = None;
        for resource in &resources {
            let value = match resource.value() {
                Some(value) => value,
                None => continue,
            };
            let path = self.table.render_value(value, self.locale);
            let density = resource.ty.density();
            if selected.is_none() || density == DENSITY_DEFAULT {
                selected = Some(path.clone());
            }
            self.icon_paths.push(IconPath { path, density });
        }
        self.meta.icon = selected.or_else(|| Some(icon.value.clone()));
    }

    fn on_uses_feature(&mut self, element: &XmlStartElement) {
        let required = element.get_bool("required", false);
        if let Some(name) = element.get_string("name") {
            self.meta.uses_features.push(UseFeature {
                name: Some(name.to_string()),
                required,
            });
        } else if let Some(version) = element.get_i64("glEsVersion") {
            let version = version as u32;
            self.meta.gl_es_version = Some(GlEsVersion {
                major: version >> 16,
                minor: version & 0xffff,
                required,
            });
        }
    }

    fn on_permission(&mut self, element: &XmlStartElement) {
        self.meta.permissions.push(Permission {
            name: owned(element.get_string("name")),
            label: owned(element.get_string("label")),
            icon: owned(element.get_string("icon")),
            description: owned(element.get_string("description")),
            group: owned(element.get_string("group")),
            protection_level: owned(element.get_string("protectionLevel")),
        });
    }
}

impl XmlVisitor for ApkMetaTranslator<'_> {
    fn on_start_element(&mut self, element: &XmlStartElement) {
        match &*element.name {
            "manifest" => self.on_manifest(element),
            "application" => self.on_application(element),
            "uses-sdk" => {
                self.meta.min_sdk_version = owned(element.get_string("minSdkVersion"));
                self.meta.target_sdk_version = owned(element.get_string("targetSdkVersion"));
                self.meta.max_sdk_version = owned(element.get_string("maxSdkVersion"));
            }
            "supports-screens" => {
                self.meta.any_density = element.get_bool("anyDensity", false);
                self.meta.small_screens = element.get_bool("smallScreens", false);
                self.meta.normal_screens = element.get_bool("normalScreens", false);
                self.meta.large_screens = element.get_bool("largeScreens", false);
            }
            "uses-feature" => self.on_uses_feature(element),
            "uses-permission" => {
                if let Some(name) = element.get_string("name") {
                    self.meta.uses_permissions.push(name.to_string());
                }
            }
            "permission" => self.on_permission(element),
            _ => {}
        }
    }

    fn on_end_element(&mut self, _element: &XmlEndElement) {}
}
