// Copyright @yucwang 2026

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use quick_xml::events::Event;
use quick_xml::Reader;

use crate::math::constants::Float;
use crate::renderers::progressive::RenderSettings;
use crate::sources::SourceSpec;

#[derive(thiserror::Error, Debug)]
pub enum SessionLoadError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("xml error: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("{0}")]
    Parse(String),
}

/// Everything a session file may set. Absent entries keep their defaults.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionLoadResult {
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub samples: Option<u32>,
    pub workers: Option<usize>,
    pub in_flight: Option<usize>,
    pub present_every: Option<u32>,
    pub max_retries: Option<u32>,
    pub source: Option<SourceSpec>,
}

impl SessionLoadResult {
    pub fn apply(&self, settings: &mut RenderSettings) {
        if let Some(v) = self.width { settings.width = v; }
        if let Some(v) = self.height { settings.height = v; }
        if let Some(v) = self.samples { settings.samples = v; }
        if let Some(v) = self.workers {
            settings.workers = v;
            settings.in_flight = v.max(1) * 2;
        }
        if let Some(v) = self.in_flight { settings.in_flight = v; }
        if let Some(v) = self.present_every { settings.present_every = v; }
        if let Some(v) = self.max_retries { settings.max_retries = v; }
    }
}

pub fn load_session<P: AsRef<Path>>(path: P) -> Result<SessionLoadResult, SessionLoadError> {
    let xml = fs::read_to_string(path.as_ref())?;
    log::info!("loading session from {}", path.as_ref().display());
    parse_session(&xml)
}

/// Parses a session description such as:
///
/// ```xml
/// <session>
///     <default name="spp" value="256"/>
///     <integer name="width" value="640"/>
///     <integer name="samples" value="$spp"/>
///     <source type="blackbody">
///         <float name="min_kelvin" value="1500"/>
///     </source>
/// </session>
/// ```
pub fn parse_session(xml: &str) -> Result<SessionLoadResult, SessionLoadError> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);
    let mut buf = Vec::new();

    let mut defaults: HashMap<String, String> = HashMap::new();
    let mut result = SessionLoadResult::default();

    let mut in_source = false;
    let mut current_source_type: Option<String> = None;
    let mut current_source_params: HashMap<String, String> = HashMap::new();

    loop {
        buf.clear();
        let event = reader.read_event_into(&mut buf)?;
        match event {
            Event::Eof => {
                if in_source {
                    return Err(SessionLoadError::Parse(String::from("unclosed <source> element")));
                }
                break;
            }
            Event::Start(ref e) | Event::Empty(ref e) => {
                let self_closing = matches!(event, Event::Empty(_));
                let mut name: Option<String> = None;
                let mut value: Option<String> = None;
                let mut kind: Option<String> = None;
                for attr in e.attributes().flatten() {
                    let text = attr.unescape_value().unwrap_or_default().to_string();
                    match attr.key.as_ref() {
                        b"name" => name = Some(text),
                        b"value" => value = Some(text),
                        b"type" => kind = Some(resolve_value(&text, &defaults)),
                        _ => {}
                    }
                }

                match e.name().as_ref() {
                    b"session" => {}
                    b"default" => {
                        if let (Some(k), Some(v)) = (name, value) {
                            defaults.insert(k, v);
                        }
                    }
                    b"source" => {
                        if in_source {
                            return Err(SessionLoadError::Parse(String::from("nested <source> elements")));
                        }
                        let kind = kind.ok_or_else(|| SessionLoadError::Parse(String::from("<source> needs a type")))?;
                        if self_closing {
                            result.source = Some(build_source(&kind, &HashMap::new())?);
                        } else {
                            in_source = true;
                            current_source_type = Some(kind);
                            current_source_params.clear();
                        }
                    }
                    tag @ (b"integer" | b"float" | b"rgba") => {
                        let tag = String::from_utf8_lossy(tag).to_string();
                        let name = name.ok_or_else(|| SessionLoadError::Parse(format!("<{}> needs a name", tag)))?;
                        let value = value.ok_or_else(|| SessionLoadError::Parse(format!("<{}> needs a value", tag)))?;
                        let value = resolve_value(&value, &defaults);
                        if in_source {
                            current_source_params.insert(name, value);
                        } else if tag == "integer" {
                            set_session_integer(&mut result, &name, &value)?;
                        } else {
                            return Err(SessionLoadError::Parse(format!("unexpected <{}> outside <source>", tag)));
                        }
                    }
                    other => {
                        return Err(SessionLoadError::Parse(format!(
                            "unsupported element <{}>",
                            String::from_utf8_lossy(other)
                        )));
                    }
                }
            }
            Event::End(ref e) => {
                if e.name().as_ref() == b"source" && in_source {
                    in_source = false;
                    if let Some(kind) = current_source_type.take() {
                        result.source = Some(build_source(&kind, &current_source_params)?);
                    }
                }
            }
            _ => {}
        }
    }

    Ok(result)
}

fn set_session_integer(result: &mut SessionLoadResult, name: &str, value: &str) -> Result<(), SessionLoadError> {
    match name {
        "width" => result.width = Some(parse_u32(value)?),
        "height" => result.height = Some(parse_u32(value)?),
        "samples" | "spp" => result.samples = Some(parse_u32(value)?),
        "workers" => result.workers = Some(parse_usize(value)?),
        "in_flight" => result.in_flight = Some(parse_usize(value)?),
        "present_every" => result.present_every = Some(parse_u32(value)?),
        "max_retries" => result.max_retries = Some(parse_u32(value)?),
        _ => return Err(SessionLoadError::Parse(format!("unknown setting: {}", name))),
    }
    Ok(())
}

fn build_source(kind: &str, params: &HashMap<String, String>) -> Result<SourceSpec, SessionLoadError> {
    let mut spec = SourceSpec::from_kind(kind)
        .ok_or_else(|| SessionLoadError::Parse(format!("unsupported source: {}", kind)))?;

    for (name, value) in params {
        match (&mut spec, name.as_str()) {
            (SourceSpec::Constant { rgba }, "value") => *rgba = parse_rgba(value)?,
            (SourceSpec::Noise { seed }, "seed") => *seed = parse_u64(value)?,
            (SourceSpec::Blackbody { seed, .. }, "seed") => *seed = parse_u64(value)?,
            (SourceSpec::Blackbody { min_kelvin, .. }, "min_kelvin") => *min_kelvin = parse_float(value)?,
            (SourceSpec::Blackbody { max_kelvin, .. }, "max_kelvin") => *max_kelvin = parse_float(value)?,
            _ => {
                return Err(SessionLoadError::Parse(format!("unknown parameter '{}' for {} source", name, kind)));
            }
        }
    }
    Ok(spec)
}

/// Longer names are substituted first so `$ab` never resolves through `$a`.
fn resolve_value(raw: &str, defaults: &HashMap<String, String>) -> String {
    let mut names: Vec<&String> = defaults.keys().collect();
    names.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));

    let mut out = raw.to_string();
    for name in names {
        out = out.replace(&format!("${}", name), &defaults[name]);
    }
    out
}

fn parse_float(value: &str) -> Result<Float, SessionLoadError> {
    value.trim().parse::<Float>().map_err(|_| SessionLoadError::Parse(format!("invalid float: {}", value)))
}

fn parse_u32(value: &str) -> Result<u32, SessionLoadError> {
    value.trim().parse::<u32>().map_err(|_| SessionLoadError::Parse(format!("invalid integer: {}", value)))
}

fn parse_u64(value: &str) -> Result<u64, SessionLoadError> {
    value.trim().parse::<u64>().map_err(|_| SessionLoadError::Parse(format!("invalid integer: {}", value)))
}

fn parse_usize(value: &str) -> Result<usize, SessionLoadError> {
    value.trim().parse::<usize>().map_err(|_| SessionLoadError::Parse(format!("invalid integer: {}", value)))
}

fn parse_rgba(value: &str) -> Result<[Float; 4], SessionLoadError> {
    let parts: Vec<&str> = value.split(',').map(|s| s.trim()).filter(|s| !s.is_empty()).collect();
    if parts.len() != 4 {
        return Err(SessionLoadError::Parse(format!("invalid rgba: {}", value)));
    }
    let mut rgba = [0.0; 4];
    for (slot, part) in rgba.iter_mut().zip(parts) {
        *slot = parse_float(part)?;
    }
    Ok(rgba)
}
