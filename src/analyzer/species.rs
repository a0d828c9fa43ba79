//! Species tensor label parsing.
//!
//! BirdNET-style labels are formatted `<scientific>_<common>`, e.g.
//! `Turdus migratorius_American Robin`.

/// Structured components of a classifier label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedSpecies {
    /// Scientific (latin) name.
    pub scientific_name: String,
    /// Common name; empty when the label carries none.
    pub common_name: String,
    /// The raw label as emitted by the model.
    pub species_tensor: String,
}

/// Split a species tensor label into its components.
///
/// When the `_` separator is absent, the whole label is treated as the
/// scientific name and the common name is left empty.
pub fn parse(label: &str) -> ParsedSpecies {
    match label.split_once('_') {
        Some((scientific, common)) => ParsedSpecies {
            scientific_name: scientific.to_string(),
            common_name: common.to_string(),
            species_tensor: label.to_string(),
        },
        None => ParsedSpecies {
            scientific_name: label.to_string(),
            common_name: String::new(),
            species_tensor: label.to_string(),
        },
    }
}
