use serde_json::{Map, Value};

/// A capture's metadata dictionary, keyed by container (`{Exif}`, `{TIFF}`, ...).
pub type PhotoMetadata = Map<String, Value>;

/// Key of the EXIF sub-dictionary.
pub const EXIF_DICTIONARY: &str = "{Exif}";
/// Key of the TIFF sub-dictionary (make, model, description).
pub const TIFF_DICTIONARY: &str = "{TIFF}";
/// Comment stamped into every capture unless configured otherwise.
pub const DEFAULT_USER_COMMENT: &str = "Captured by bracket-raw";

const USER_COMMENT: &str = "UserComment";

/// Patches capture metadata before it is serialized.
///
/// # Example
///
/// ```rust
/// use bracket_raw::exif::{MetadataEditor, PhotoMetadata, EXIF_DICTIONARY};
/// use serde_json::json;
///
/// let mut metadata = PhotoMetadata::new();
/// metadata.insert(EXIF_DICTIONARY.into(), json!({ "ExposureTime": 0.01 }));
///
/// let patched = MetadataEditor::new("bracket 3").patch(&metadata);
/// assert_eq!(patched[EXIF_DICTIONARY]["UserComment"], "bracket 3");
/// // The input is left untouched
/// assert!(metadata[EXIF_DICTIONARY].get("UserComment").is_none());
/// ```
#[derive(Debug, Clone)]
pub struct MetadataEditor {
    user_comment: String,
}

impl MetadataEditor {
    pub fn new(user_comment: impl Into<String>) -> Self {
        Self {
            user_comment: user_comment.into(),
        }
    }

    pub fn user_comment(&self) -> &str {
        &self.user_comment
    }

    /// Return a copy of `metadata` with the user comment set in its EXIF dictionary.
    ///
    /// Metadata without an `{Exif}` dictionary is copied unchanged.
    pub fn patch(&self, metadata: &PhotoMetadata) -> PhotoMetadata {
        let mut patched = metadata.clone();
        if let Some(Value::Object(exif)) = patched.get_mut(EXIF_DICTIONARY) {
            exif.insert(
                USER_COMMENT.to_string(),
                Value::String(self.user_comment.clone()),
            );
        }
        patched
    }
}

impl Default for MetadataEditor {
    fn default() -> Self {
        Self::new(DEFAULT_USER_COMMENT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn metadata(value: Value) -> PhotoMetadata {
        match value {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[test]
    fn sets_comment_in_exif_dictionary() {
        let md = metadata(json!({ "{Exif}": { "ISOSpeedRatings": [100] } }));
        let patched = MetadataEditor::default().patch(&md);
        assert_eq!(patched["{Exif}"]["UserComment"], DEFAULT_USER_COMMENT);
        assert_eq!(patched["{Exif}"]["ISOSpeedRatings"], json!([100]));
    }

    #[test]
    fn overwrites_existing_comment() {
        let md = metadata(json!({ "{Exif}": { "UserComment": "old" } }));
        let patched = MetadataEditor::new("new").patch(&md);
        assert_eq!(patched["{Exif}"]["UserComment"], "new");
    }

    #[test]
    fn without_exif_dictionary_is_unchanged() {
        let md = metadata(json!({ "{TIFF}": { "Make": "Acme" } }));
        let patched = MetadataEditor::default().patch(&md);
        assert_eq!(patched, md);
    }

    #[test]
    fn non_object_exif_entry_is_left_alone() {
        let md = metadata(json!({ "{Exif}": "opaque" }));
        assert_eq!(MetadataEditor::default().patch(&md), md);
    }

    #[test]
    fn input_is_not_modified() {
        let md = metadata(json!({ "{Exif}": {} }));
        let _ = MetadataEditor::default().patch(&md);
        assert_eq!(md["{Exif}"], json!({}));
    }
}
