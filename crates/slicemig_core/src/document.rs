use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

pub const SHARED_SECTION_SLICE_TYPE: &str = "shared_section";
pub const DEFAULT_SLICE_ZONE: &str = "body";
pub const DOCUMENT_LINK_TYPE: &str = "Document";

/// A Prismic document as returned by the content API search endpoint.
///
/// Only the fields this tool reads are typed; everything else the API sends
/// is kept in `extra` so a saved document round-trips unchanged.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Document {
    pub id: String,
    #[serde(default)]
    pub uid: Option<String>,
    #[serde(rename = "type", default)]
    pub document_type: String,
    #[serde(default)]
    pub lang: String,
    #[serde(default)]
    pub slugs: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub first_publication_date: Option<String>,
    #[serde(default)]
    pub last_publication_date: Option<String>,
    #[serde(default)]
    pub alternate_languages: Vec<Alternate>,
    #[serde(default)]
    pub data: Map<String, Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Alternate {
    pub id: String,
    #[serde(default)]
    pub uid: Option<String>,
    #[serde(rename = "type", default)]
    pub document_type: String,
    pub lang: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Slice {
    pub slice_type: String,
    #[serde(default)]
    pub primary: Map<String, Value>,
    #[serde(default)]
    pub items: Vec<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Link metadata pointing at the shared document. Built once per run and
/// only read afterwards, so the fields stay private.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SharedSectionReference {
    id: String,
    document_type: String,
    tags: Vec<String>,
    lang: String,
    slug: Option<String>,
    first_publication_date: Option<String>,
    last_publication_date: Option<String>,
    uid: Option<String>,
}

impl SharedSectionReference {
    pub fn from_document(document: &Document) -> Self {
        Self {
            id: document.id.clone(),
            document_type: document.document_type.clone(),
            tags: document.tags.clone(),
            lang: document.lang.clone(),
            slug: document.slugs.first().cloned(),
            first_publication_date: document.first_publication_date.clone(),
            last_publication_date: document.last_publication_date.clone(),
            uid: document.uid.clone(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn lang(&self) -> &str {
        &self.lang
    }

    pub fn to_value(&self) -> Value {
        json!({
            "id": self.id,
            "type": self.document_type,
            "tags": self.tags,
            "lang": self.lang,
            "slug": self.slug,
            "first_publication_date": self.first_publication_date,
            "last_publication_date": self.last_publication_date,
            "uid": self.uid,
            "link_type": DOCUMENT_LINK_TYPE,
            "isBroken": false,
        })
    }
}

impl Slice {
    pub fn shared_section(reference: &SharedSectionReference) -> Self {
        let mut primary = Map::new();
        primary.insert(SHARED_SECTION_SLICE_TYPE.to_string(), reference.to_value());
        Self {
            slice_type: SHARED_SECTION_SLICE_TYPE.to_string(),
            primary,
            items: Vec::new(),
            extra: Map::new(),
        }
    }
}

impl Document {
    /// Title sent to the migration API: the first slug, or empty.
    pub fn title(&self) -> &str {
        self.slugs.first().map(String::as_str).unwrap_or("")
    }

    /// Reads the slice list stored under `zone` in `data`. A missing or null
    /// zone is an empty list.
    pub fn slices(&self, zone: &str) -> Result<Vec<Slice>> {
        match self.data.get(zone) {
            None | Some(Value::Null) => Ok(Vec::new()),
            Some(value @ Value::Array(_)) => serde_json::from_value(value.clone())
                .with_context(|| {
                    format!("failed to decode slice zone `{zone}` of document {}", self.id)
                }),
            Some(_) => bail!(
                "slice zone `{zone}` of document {} is not an array",
                self.id
            ),
        }
    }

    pub fn set_slices(&mut self, zone: &str, slices: Vec<Slice>) -> Result<()> {
        let value = serde_json::to_value(slices)
            .with_context(|| format!("failed to encode slice zone `{zone}`"))?;
        self.data.insert(zone.to_string(), value);
        Ok(())
    }

    pub fn count_slices(&self, zone: &str, slice_type: &str) -> Result<usize> {
        Ok(count_matching_slices(&self.slices(zone)?, slice_type))
    }

    /// Returns a copy with every `slice_type` slice swapped for a shared
    /// section reference. Documents with nothing to replace come back unchanged.
    pub fn with_shared_section(
        &self,
        zone: &str,
        slice_type: &str,
        reference: &SharedSectionReference,
    ) -> Result<Document> {
        let mut updated = self.clone();
        let slices = self.slices(zone)?;
        if count_matching_slices(&slices, slice_type) == 0 {
            return Ok(updated);
        }
        updated.set_slices(zone, replace_matching_slices(&slices, slice_type, reference))?;
        Ok(updated)
    }
}

/// Alternates whose language tag starts with `{prefix}-`, in input order.
pub fn resolve_alternates(alternates: &[Alternate], prefix: &str) -> Vec<Alternate> {
    let needle = format!("{prefix}-");
    alternates
        .iter()
        .filter(|alternate| alternate.lang.starts_with(&needle))
        .cloned()
        .collect()
}

pub fn count_matching_slices(slices: &[Slice], slice_type: &str) -> usize {
    slices
        .iter()
        .filter(|slice| slice.slice_type == slice_type)
        .count()
}

pub fn replace_matching_slices(
    slices: &[Slice],
    slice_type: &str,
    reference: &SharedSectionReference,
) -> Vec<Slice> {
    slices
        .iter()
        .map(|slice| {
            if slice.slice_type == slice_type {
                Slice::shared_section(reference)
            } else {
                slice.clone()
            }
        })
        .collect()
}
