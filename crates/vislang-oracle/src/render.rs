//! Renderer boundary
//!
//! A [`Chart`] is a Vega-Lite specification bound to concrete data. Building
//! one ([`Renderer::construct`]) and rasterizing it ([`Renderer::export_png`])
//! fail independently: a chart that exists in memory but cannot be exported
//! is still evidence worth keeping.

use crate::error::RenderError;
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::path::PathBuf;
use tokio::process::Command;
use vislang_schema::Dataset;

/// Mark types accepted at construction
pub const KNOWN_MARKS: &[&str] = &[
    "arc", "area", "bar", "boxplot", "circle", "errorband", "errorbar", "geoshape", "image",
    "line", "point", "rect", "rule", "square", "text", "tick", "trail",
];

/// Encoding channels accepted at construction
pub const KNOWN_CHANNELS: &[&str] = &[
    "x", "y", "x2", "y2", "xOffset", "yOffset", "color", "fill", "stroke", "opacity",
    "fillOpacity", "strokeOpacity", "strokeWidth", "strokeDash", "size", "shape", "angle",
    "theta", "theta2", "radius", "radius2", "text", "tooltip", "href", "url", "description",
    "detail", "key", "order", "row", "column", "facet", "latitude", "longitude", "latitude2",
    "longitude2",
];

/// Top-level keys that cannot appear inside compositions
const TOP_LEVEL_ONLY: &[&str] = &["data", "$schema"];

/// Chart specification bound to inline data
#[derive(Debug, Clone, PartialEq)]
pub struct Chart {
    spec: Value,
}

impl Chart {
    /// Full specification including `data.values`
    #[inline]
    #[must_use]
    pub fn spec(&self) -> &Value {
        &self.spec
    }

    /// Specification without its inline data
    #[must_use]
    pub fn design(&self) -> Value {
        let mut spec = self.spec.clone();
        if let Value::Object(map) = &mut spec {
            map.remove("data");
        }
        spec
    }

    /// Copy of the full specification with a title
    #[must_use]
    pub fn titled(&self, title: &str) -> Value {
        let mut spec = self.spec.clone();
        if let Value::Object(map) = &mut spec {
            map.insert("title".into(), Value::String(title.into()));
        }
        spec
    }

    /// Re-run the structural checks on the bound specification
    ///
    /// # Errors
    /// `RenderError::Construction` if the specification no longer checks out.
    pub fn revalidate(&self) -> Result<(), RenderError> {
        let Value::Object(map) = &self.spec else {
            return Err(RenderError::Construction("chart specification is not an object".into()));
        };
        check_view(map, None, false)
    }
}

/// Builds charts and rasterizes them
#[async_trait]
pub trait Renderer: Send + Sync {
    /// Bind a specification to data
    async fn construct(&self, spec: &Value, data: &Dataset) -> Result<Chart, RenderError>;

    /// Rasterize to PNG bytes
    async fn export_png(&self, chart: &Chart) -> Result<Vec<u8>, RenderError>;
}

/// Bind a Vega-Lite specification to a dataset
///
/// Drops `data` and `$schema`, inlines the rows, and checks mark types,
/// encoding shape and field references. Field references are only checked
/// when no `transform` could have derived them.
///
/// # Errors
/// `RenderError::Construction` with a message suitable for a corrective turn.
pub fn bind(spec: &Value, data: &Dataset) -> Result<Chart, RenderError> {
    let Value::Object(source) = spec else {
        return Err(RenderError::Construction(
            "specification must be a JSON object".into(),
        ));
    };

    let mut map: Map<String, Value> = source
        .iter()
        .filter(|(k, _)| !TOP_LEVEL_ONLY.contains(&k.as_str()))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();

    check_view(&map, Some(data), false)?;

    let mut data_obj = Map::new();
    data_obj.insert("values".into(), data.to_values());
    map.insert("data".into(), Value::Object(data_obj));

    Ok(Chart {
        spec: Value::Object(map),
    })
}

fn check_view(
    view: &Map<String, Value>,
    data: Option<&Dataset>,
    inherited_transform: bool,
) -> Result<(), RenderError> {
    let derived = inherited_transform || view.contains_key("transform");

    if let Some(mark) = view.get("mark") {
        check_mark(mark)?;
    }

    if let Some(encoding) = view.get("encoding") {
        let Value::Object(channels) = encoding else {
            return Err(RenderError::Construction("'encoding' must be an object".into()));
        };
        for (channel, def) in channels {
            if !KNOWN_CHANNELS.contains(&channel.as_str()) {
                return Err(RenderError::Construction(format!(
                    "unknown encoding channel '{channel}'"
                )));
            }
            let defs: Vec<&Value> = match def {
                Value::Array(items) => items.iter().collect(),
                other => vec![other],
            };
            for def in defs {
                check_channel_def(channel, def, data, derived)?;
            }
        }
    }

    if let Some(layer) = view.get("layer") {
        let Value::Array(layers) = layer else {
            return Err(RenderError::Construction("'layer' must be an array".into()));
        };
        for (i, item) in layers.iter().enumerate() {
            let Value::Object(sub) = item else {
                return Err(RenderError::Construction(format!("layer {i} is not an object")));
            };
            check_view(sub, data, derived)?;
        }
    }

    Ok(())
}

fn check_mark(mark: &Value) -> Result<(), RenderError> {
    let name = match mark {
        Value::String(s) => s.as_str(),
        Value::Object(m) => m.get("type").and_then(Value::as_str).ok_or_else(|| {
            RenderError::Construction("mark definition is missing a string 'type'".into())
        })?,
        other => {
            return Err(RenderError::Construction(format!(
                "mark must be a string or object, got {other}"
            )))
        }
    };
    if KNOWN_MARKS.contains(&name) {
        Ok(())
    } else {
        Err(RenderError::Construction(format!("unknown mark type '{name}'")))
    }
}

fn check_channel_def(
    channel: &str,
    def: &Value,
    data: Option<&Dataset>,
    derived: bool,
) -> Result<(), RenderError> {
    let Value::Object(def) = def else {
        return Err(RenderError::Construction(format!(
            "encoding for channel '{channel}' must be an object"
        )));
    };

    if let (Some(Value::String(field)), Some(data)) = (def.get("field"), data) {
        let base = field.split('.').next().unwrap_or(field);
        if !derived && !data.has_column(field) && !data.has_column(base) {
            return Err(RenderError::Construction(format!(
                "field '{field}' used in channel '{channel}' is not in the data (available: {})",
                data.columns().join(", ")
            )));
        }
    }
    Ok(())
}

/// Renderer that binds in-process and rasterizes with the `vl-convert` CLI
#[derive(Debug, Clone)]
pub struct VegaLiteRenderer {
    binary: PathBuf,
    scale: f32,
}

impl VegaLiteRenderer {
    /// Create renderer using the given `vl-convert` binary
    #[inline]
    #[must_use]
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            scale: 1.0,
        }
    }

    /// With output scale factor
    #[inline]
    #[must_use]
    pub fn with_scale(mut self, scale: f32) -> Self {
        self.scale = scale;
        self
    }
}

impl Default for VegaLiteRenderer {
    fn default() -> Self {
        Self::new("vl-convert")
    }
}

#[async_trait]
impl Renderer for VegaLiteRenderer {
    async fn construct(&self, spec: &Value, data: &Dataset) -> Result<Chart, RenderError> {
        bind(spec, data)
    }

    async fn export_png(&self, chart: &Chart) -> Result<Vec<u8>, RenderError> {
        let dir = tempfile::tempdir().map_err(|e| RenderError::Export(e.to_string()))?;
        let input = dir.path().join("chart.vl.json");
        let output = dir.path().join("chart.png");

        tokio::fs::write(&input, chart.spec().to_string())
            .await
            .map_err(|e| RenderError::Export(e.to_string()))?;

        let result = Command::new(&self.binary)
            .arg("vl2png")
            .arg("--input")
            .arg(&input)
            .arg("--output")
            .arg(&output)
            .arg("--scale")
            .arg(self.scale.to_string())
            .output()
            .await
            .map_err(|e| {
                RenderError::Export(format!("failed to run {}: {e}", self.binary.display()))
            })?;

        if !result.status.success() {
            return Err(RenderError::Export(
                String::from_utf8_lossy(&result.stderr).trim().to_string(),
            ));
        }

        let png = tokio::fs::read(&output)
            .await
            .map_err(|e| RenderError::Export(e.to_string()))?;
        if png.is_empty() {
            return Err(RenderError::Export("exported image is empty".into()));
        }
        Ok(png)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn data() -> Dataset {
        Dataset::from_records(vec![
            json!({"species": "Adelie", "body_mass": 3750})
                .as_object()
                .cloned()
                .unwrap(),
        ])
    }

    #[test]
    fn bind_inlines_data_and_drops_top_level_keys() {
        let spec = json!({
            "$schema": "https://vega.github.io/schema/vega-lite/v5.json",
            "data": {"url": "penguins.json"},
            "mark": "bar",
            "encoding": {"x": {"field": "species", "type": "nominal"}},
        });
        let chart = bind(&spec, &data()).unwrap();

        assert!(chart.spec().get("$schema").is_none());
        assert_eq!(chart.spec()["data"]["values"][0]["species"], "Adelie");
        assert!(chart.design().get("data").is_none());
        assert!(chart.revalidate().is_ok());
    }

    #[test]
    fn unknown_mark_is_construction_error() {
        let err = bind(&json!({"mark": "pie", "encoding": {}}), &data()).unwrap_err();
        assert_eq!(err, RenderError::Construction("unknown mark type 'pie'".into()));

        let err = bind(&json!({"mark": {"filled": true}}), &data()).unwrap_err();
        assert!(matches!(err, RenderError::Construction(_)));
    }

    #[test]
    fn unknown_field_is_construction_error_without_transforms() {
        let spec = json!({"mark": "point", "encoding": {"y": {"field": "flipper"}}});
        let err = bind(&spec, &data()).unwrap_err();
        assert!(err.to_string().contains("field 'flipper'"));

        let derived = json!({
            "transform": [{"calculate": "datum.body_mass / 1000", "as": "flipper"}],
            "mark": "point",
            "encoding": {"y": {"field": "flipper"}},
        });
        assert!(bind(&derived, &data()).is_ok());
    }

    #[test]
    fn tooltip_arrays_and_layers_are_checked() {
        let spec = json!({
            "layer": [
                {"mark": "bar", "encoding": {"tooltip": [{"field": "species"}, {"field": "body_mass"}]}},
                {"mark": {"type": "rule"}, "encoding": {"y": {"aggregate": "mean", "field": "body_mass"}}},
            ]
        });
        assert!(bind(&spec, &data()).is_ok());

        let bad = json!({"layer": [{"mark": "bar", "encoding": {"colour": {"field": "species"}}}]});
        assert!(bind(&bad, &data()).unwrap_err().to_string().contains("colour"));
    }

    #[test]
    fn titled_copy_keeps_original() {
        let chart = bind(&json!({"mark": "bar"}), &data()).unwrap();
        let titled = chart.titled("With Draco");
        assert_eq!(titled["title"], "With Draco");
        assert!(chart.spec().get("title").is_none());
    }

    #[tokio::test]
    async fn missing_rasterizer_is_export_error() {
        let renderer = VegaLiteRenderer::new("/nonexistent/vl-convert");
        let chart = renderer
            .construct(&json!({"mark": "bar"}), &data())
            .await
            .unwrap();
        let err = renderer.export_png(&chart).await.unwrap_err();
        assert!(err.chart_constructed());
    }
}
