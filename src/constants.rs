//! Application constants for the CTD processor
//!
//! Variable and dimension names, the catalog field table, and the file
//! naming conventions shared by the tagging and standardization passes.

// =============================================================================
// Dimensions and Variables
// =============================================================================

/// Dimension holding one row per profile (cast)
pub const PROFILE_DIM: &str = "profile";

/// Shared observation dimension
pub const OBS_DIM: &str = "obs";

pub const PROFILE_ID: &str = "profile_id";

/// Historical spelling of the profile identifier field
pub const PROFILE_ID_LEGACY: &str = "profile_ID";

pub const LAT: &str = "lat";
pub const LON: &str = "lon";
pub const TIMESTAMP: &str = "timestamp";
pub const DATESTR: &str = "datestr";
pub const TIMEZONE: &str = "timezone";

pub const DEPTH: &str = "depth";
pub const PRESS: &str = "press";
pub const TEMP: &str = "temp";
pub const PSAL: &str = "psal";

/// In-situ conductivity (mS/cm)
pub const CONDUCTIVITY: &str = "conductivity";

/// Observation variables that receive `len<var>` / `sum<var>` attributes
pub const SUMMARY_VARIABLES: &[&str] = &[DEPTH, PRESS, TEMP, PSAL];

/// Observation → profile index (0-based) on a shared obs dimension
pub const PARENT_INDEX: &str = "parent_index";

/// Per-profile sample count on a shared obs dimension
pub const ROW_SIZE: &str = "row_size";

/// Suffix of per-variable row-size arrays (`depth_row_size`, `press_row_size`)
pub const ROW_SIZE_SUFFIX: &str = "_row_size";

/// Timezone identifier written on normalized timestamp strings
pub const UTC_ZONE: &str = "UTC";

/// Row-size variable name for a ragged variable
pub fn row_size_name(variable: &str) -> String {
    format!("{}{}", variable, ROW_SIZE_SUFFIX)
}

/// Alternative names seen in source archives, mapped to the canonical name
pub const VARIABLE_ALIASES: &[(&str, &str)] = &[
    ("latitude", LAT),
    ("longitude", LON),
    ("temperature", TEMP),
    ("pressure", PRESS),
    ("z", DEPTH),
    ("salinity", PSAL),
    ("sal", PSAL),
    ("SP", PSAL),
    ("cond", CONDUCTIVITY),
    ("CNDC", CONDUCTIVITY),
    ("serialtime", TIMESTAMP),
    ("filename", "orig_filename"),
    ("dataset", "dataset_name"),
];

// =============================================================================
// Catalog
// =============================================================================

/// Storage type of a catalog field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    Float,
}

/// A per-profile metadata field carried in the catalog
#[derive(Debug, Clone, Copy)]
pub struct CatalogField {
    pub name: &'static str,
    pub kind: FieldKind,
}

const fn text(name: &'static str) -> CatalogField {
    CatalogField {
        name,
        kind: FieldKind::Text,
    }
}

const fn float(name: &'static str) -> CatalogField {
    CatalogField {
        name,
        kind: FieldKind::Float,
    }
}

/// Fields gathered into the catalog, in column order
pub const CATALOG_FIELDS: &[CatalogField] = &[
    text(PROFILE_ID),
    text("creation_date"),
    text("orig_profile_id"),
    text("orig_cruise_id"),
    text("access_no"),
    text("dataset_name"),
    text("cruise_name"),
    text("chief_scientist"),
    text("platform"),
    text("instrument_type"),
    text("orig_filename"),
    text("orig_data_credit"),
    text("station_no"),
    text(DATESTR),
    float(TIMESTAMP),
    float(LAT),
    float(LON),
    float("num_records"),
    float("shallowest_depth"),
    float("deepest_depth"),
    float("bottom_depth"),
];

/// Catalog fields stored as coordinates
pub const COORDINATE_FIELDS: &[&str] = &[TIMESTAMP, LAT, LON];

/// Catalog attribute recording when the catalog was first written
pub const CREATION_DATE_ATTR: &str = "creation_date";

/// Catalog attribute recording the latest rewrite
pub const MODIFIED_DATE_ATTR: &str = "date_modified";

/// Format of catalog date attributes
pub const CATALOG_DATE_FORMAT: &str = "%Y-%m-%d %H:%M";

// =============================================================================
// Dataset Stores and Naming
// =============================================================================

/// Manifest file marking a directory as a dataset store
pub const MANIFEST_FILE: &str = "dataset.json";

/// Extension of per-dimension table files inside a store
pub const DIMENSION_FILE_EXTENSION: &str = "parquet";

pub const DEFAULT_RAW_DIR: &str = "raw";
pub const DEFAULT_TAGGED_DIR: &str = "tagged";
pub const DEFAULT_STANDARD_DIR: &str = "standard";
pub const DEFAULT_TAGGED_SUFFIX: &str = "_id";
pub const DEFAULT_STANDARD_SUFFIX: &str = "_standard";

/// Civil timestamp format of `datestr` values
pub const DEFAULT_DATESTR_FORMAT: &str = "%Y/%m/%d %H:%M:%S";

/// Manifest written beside the live one and renamed over it
pub const MANIFEST_TMP_FILE: &str = "dataset.json.tmp";

/// Get the table file name of a dimension in one store generation
pub fn dimension_filename(dimension: &str, generation: u64) -> String {
    format!("{}-{}.{}", dimension, generation, DIMENSION_FILE_EXTENSION)
}

/// Look up a catalog field by name
pub fn catalog_field(name: &str) -> Option<&'static CatalogField> {
    CATALOG_FIELDS.iter().find(|field| field.name == name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_catalog_fields_unique() {
        let names: HashSet<_> = CATALOG_FIELDS.iter().map(|f| f.name).collect();
        assert_eq!(names.len(), CATALOG_FIELDS.len());
    }

    #[test]
    fn test_coordinates_are_catalog_fields() {
        for coord in COORDINATE_FIELDS {
            let field = catalog_field(coord).unwrap();
            assert_eq!(field.kind, FieldKind::Float);
        }
        assert_eq!(catalog_field(PROFILE_ID).unwrap().kind, FieldKind::Text);
        assert!(catalog_field("nonexistent").is_none());
    }

    #[test]
    fn test_names() {
        assert_eq!(row_size_name(DEPTH), "depth_row_size");
        assert_eq!(dimension_filename(PROFILE_DIM, 3), "profile-3.parquet");
    }
}
