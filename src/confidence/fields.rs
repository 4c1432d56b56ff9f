// Closed field-descriptor catalog
// Every scoreable field is declared here with its importance weight and
// category. The scorer refuses ledger rows naming anything else, so a typo'd
// field name surfaces as a unit error instead of silently dropping provenance.

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldCategory {
    CoreIdentity,
    Collaborators,
    Descriptive,
    Visual,
    Ratings,
}

impl FieldCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldCategory::CoreIdentity => "core_identity",
            FieldCategory::Collaborators => "collaborators",
            FieldCategory::Descriptive => "descriptive",
            FieldCategory::Visual => "visual",
            FieldCategory::Ratings => "ratings",
        }
    }
}

/// One entry of the closed field set. Weights live in [0.2, 1.0]; identity
/// fields weigh highest, optional metadata lowest.
#[derive(Debug, Clone, Copy)]
pub struct FieldDescriptor {
    pub name: &'static str,
    pub weight: f64,
    pub category: FieldCategory,
}

pub const MOVIE_FIELDS: &[FieldDescriptor] = &[
    FieldDescriptor { name: "title", weight: 1.0, category: FieldCategory::CoreIdentity },
    FieldDescriptor { name: "release_year", weight: 0.9, category: FieldCategory::CoreIdentity },
    FieldDescriptor { name: "director", weight: 0.8, category: FieldCategory::Collaborators },
    FieldDescriptor { name: "cast_names", weight: 0.7, category: FieldCategory::Collaborators },
    FieldDescriptor { name: "synopsis", weight: 0.5, category: FieldCategory::Descriptive },
    FieldDescriptor { name: "genres", weight: 0.6, category: FieldCategory::Descriptive },
    FieldDescriptor { name: "runtime_minutes", weight: 0.4, category: FieldCategory::Descriptive },
    FieldDescriptor { name: "poster_url", weight: 0.6, category: FieldCategory::Visual },
    FieldDescriptor { name: "rating", weight: 0.3, category: FieldCategory::Ratings },
];

// People reuse the shared columns: title holds the name, release_year the
// birth year, synopsis the bio, poster_url the headshot.
pub const PERSON_FIELDS: &[FieldDescriptor] = &[
    FieldDescriptor { name: "title", weight: 1.0, category: FieldCategory::CoreIdentity },
    FieldDescriptor { name: "release_year", weight: 0.8, category: FieldCategory::CoreIdentity },
    FieldDescriptor { name: "synopsis", weight: 0.5, category: FieldCategory::Descriptive },
    FieldDescriptor { name: "poster_url", weight: 0.6, category: FieldCategory::Visual },
];

/// Expected fields for an entity type. Callers score only these, which is how
/// "field not applicable" stays distinct from "field missing but expected".
pub fn descriptors_for(entity_type: &str) -> &'static [FieldDescriptor] {
    match entity_type {
        "person" => PERSON_FIELDS,
        _ => MOVIE_FIELDS,
    }
}

pub fn descriptor(entity_type: &str, field_name: &str) -> Option<&'static FieldDescriptor> {
    descriptors_for(entity_type).iter().find(|d| d.name == field_name)
}
