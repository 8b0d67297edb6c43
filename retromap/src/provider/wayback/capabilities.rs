//! WMTS capabilities parsing for the tile archive.
//!
//! The capabilities document lists every historical release as a WMTS
//! layer. Two pieces of each layer matter here: the numeric release
//! identifier embedded in the tile template URL, and the nominal release
//! date embedded in the human-readable title. Neither has a dedicated
//! field, so both are extracted by pattern.

use chrono::NaiveDate;
use quick_xml::events::Event;
use quick_xml::Reader;
use regex::Regex;

use crate::provider::ProviderError;

/// One historical release from the capabilities document.
#[derive(Debug, Clone, PartialEq)]
pub struct WaybackLayer {
    /// Numeric release identifier, from the tile template URL.
    pub id: u32,
    /// Nominal release date, from the layer title. Not the capture date.
    pub release_date: NaiveDate,
    pub title: String,
    /// Tile URL template with `{TileMatrix}`, `{TileRow}`, `{TileCol}`
    /// placeholders.
    pub template: String,
}

impl WaybackLayer {
    /// Resolve the template for a concrete tile address.
    pub fn tile_url(&self, zoom: u8, row: u32, col: u32) -> String {
        self.template
            .replace("{TileMatrix}", &zoom.to_string())
            .replace("{TileRow}", &row.to_string())
            .replace("{TileCol}", &col.to_string())
    }
}

/// Parse the capabilities XML into layers, newest release first.
///
/// Layers whose title carries no date or whose template carries no numeric
/// identifier are skipped with a warning rather than failing the whole
/// document; the archive has carried malformed entries before.
pub fn parse_capabilities(xml: &str) -> Result<Vec<WaybackLayer>, ProviderError> {
    // Both patterns are fixed; compilation cannot fail.
    let date_re = Regex::new(r"(\d{4})-(\d{2})-(\d{2})")
        .map_err(|e| ProviderError::Decode(e.to_string()))?;
    let id_re = Regex::new(r"/tile/(\d+)/")
        .map_err(|e| ProviderError::Decode(e.to_string()))?;

    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut layers = Vec::new();
    let mut in_layer = false;
    let mut in_title = false;
    let mut title = String::new();
    let mut template: Option<String> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"Layer" => {
                    in_layer = true;
                    title.clear();
                    template = None;
                }
                b"Title" if in_layer => in_title = true,
                _ => {}
            },
            Ok(Event::Empty(e)) if in_layer && e.local_name().as_ref() == b"ResourceURL" => {
                if let Some(attr) = e
                    .try_get_attribute("template")
                    .map_err(|e| ProviderError::Decode(format!("capabilities XML: {}", e)))?
                {
                    let value = attr
                        .unescape_value()
                        .map_err(|e| ProviderError::Decode(format!("capabilities XML: {}", e)))?;
                    template = Some(value.into_owned());
                }
            }
            Ok(Event::Text(t)) if in_title => {
                let text = t
                    .unescape()
                    .map_err(|e| ProviderError::Decode(format!("capabilities XML: {}", e)))?;
                title.push_str(&text);
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"Title" => in_title = false,
                b"Layer" if in_layer => {
                    in_layer = false;
                    if let Some(layer) = build_layer(&title, template.take(), &date_re, &id_re) {
                        layers.push(layer);
                    }
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => {
                return Err(ProviderError::Decode(format!("capabilities XML: {}", e)));
            }
        }
    }

    if layers.is_empty() {
        return Err(ProviderError::Decode(
            "capabilities document lists no usable layers".to_string(),
        ));
    }

    layers.sort_by(|a, b| b.release_date.cmp(&a.release_date).then(b.id.cmp(&a.id)));
    Ok(layers)
}

fn build_layer(
    title: &str,
    template: Option<String>,
    date_re: &Regex,
    id_re: &Regex,
) -> Option<WaybackLayer> {
    let template = template?;

    let id = id_re
        .captures(&template)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse::<u32>().ok());
    let release_date = date_re.captures(title).and_then(|c| {
        let year = c.get(1)?.as_str().parse().ok()?;
        let month = c.get(2)?.as_str().parse().ok()?;
        let day = c.get(3)?.as_str().parse().ok()?;
        NaiveDate::from_ymd_opt(year, month, day)
    });

    match (id, release_date) {
        (Some(id), Some(release_date)) => Some(WaybackLayer {
            id,
            release_date,
            title: title.to_string(),
            template,
        }),
        _ => {
            tracing::warn!(title, "skipping capabilities layer without id or date");
            None
        }
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;

    /// Minimal capabilities document with the fields the parser reads.
    pub fn capabilities_xml(layers: &[(u32, &str)]) -> String {
        let mut xml = String::from(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<Capabilities xmlns="http://www.opengis.net/wmts/1.0" xmlns:ows="http://www.opengis.net/ows/1.1">
<Contents>"#,
        );
        for (id, date) in layers {
            xml.push_str(&format!(
                r#"
<Layer>
  <ows:Title>World Imagery (Wayback {date})</ows:Title>
  <ows:Identifier>WB_{id}</ows:Identifier>
  <ResourceURL format="image/jpeg" resourceType="tile" template="https://archive.test/tile/{id}/{{TileMatrix}}/{{TileRow}}/{{TileCol}}"/>
</Layer>"#,
            ));
        }
        xml.push_str("\n</Contents>\n</Capabilities>\n");
        xml
    }

    #[test]
    fn test_parses_layers_newest_first() {
        let xml = capabilities_xml(&[(1203, "2014-02-20"), (57965, "2025-03-12"), (3310, "2018-08-01")]);
        let layers = parse_capabilities(&xml).unwrap();

        assert_eq!(layers.len(), 3);
        assert_eq!(layers[0].id, 57965);
        assert_eq!(
            layers[0].release_date,
            NaiveDate::from_ymd_opt(2025, 3, 12).unwrap()
        );
        assert_eq!(layers[2].id, 1203);
    }

    #[test]
    fn test_tile_url_substitution() {
        let xml = capabilities_xml(&[(42, "2020-01-01")]);
        let layers = parse_capabilities(&xml).unwrap();
        assert_eq!(
            layers[0].tile_url(12, 1553, 1203),
            "https://archive.test/tile/42/12/1553/1203"
        );
    }

    #[test]
    fn test_skips_layer_without_date() {
        let mut xml = capabilities_xml(&[(42, "2020-01-01")]);
        xml = xml.replace("</Contents>", r#"<Layer><ows:Title>No date here</ows:Title><ResourceURL resourceType="tile" template="https://archive.test/tile/7/{TileMatrix}/{TileRow}/{TileCol}"/></Layer></Contents>"#);
        let layers = parse_capabilities(&xml).unwrap();
        assert_eq!(layers.len(), 1);
        assert_eq!(layers[0].id, 42);
    }

    #[test]
    fn test_empty_document_is_an_error() {
        let xml = capabilities_xml(&[]);
        assert!(matches!(
            parse_capabilities(&xml),
            Err(ProviderError::Decode(_))
        ));
    }

    #[test]
    fn test_malformed_xml_is_an_error() {
        assert!(matches!(
            parse_capabilities("<Capabilities><Contents></Mismatched></Capabilities>"),
            Err(ProviderError::Decode(_))
        ));
    }
}
