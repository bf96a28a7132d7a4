//! Vector Compositing - Embed the Order Photo Into the Template
//!
//! The template is streamed through a namespace-aware reader and written back
//! event by event, so everything except the target image's href is kept
//! as it was, namespace declarations included.

use std::fs;
use std::path::Path;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use quick_xml::events::{BytesStart, Event};
use quick_xml::name::{Namespace, ResolveResult};
use quick_xml::reader::NsReader;
use quick_xml::Writer;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::pipeline::{PipelineError, PipelineResult};

pub const SVG_NAMESPACE: &[u8] = b"http://www.w3.org/2000/svg";
pub const XLINK_NAMESPACE: &[u8] = b"http://www.w3.org/1999/xlink";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbedSummary {
    /// Whether the slot sits inside a clip-path group.
    pub clip_grouped: bool,
    pub mime_type: String,
    pub payload_bytes: usize,
}

/// Image slot found in the template.
#[derive(Debug, Clone)]
struct Slot {
    event_index: usize,
    href_key: Option<String>,
}

fn is_namespace(ns: &ResolveResult<'_>, expected: &[u8]) -> bool {
    matches!(ns, ResolveResult::Bound(Namespace(uri)) if *uri == expected)
}

fn has_clip_path(element: &BytesStart<'_>) -> bool {
    element
        .attributes()
        .flatten()
        .any(|a| a.key.as_ref() == b"clip-path" && !a.value.is_empty())
}

/// MIME type from the raster's content, not its extension.
pub fn sniff_mime(bytes: &[u8], path: &Path) -> PipelineResult<&'static str> {
    image::guess_format(bytes)
        .map(|format| format.to_mime_type())
        .map_err(|_| PipelineError::UnsupportedRaster { path: path.to_path_buf() })
}

pub fn data_uri(mime: &str, bytes: &[u8]) -> String {
    format!("data:{mime};base64,{}", STANDARD.encode(bytes))
}

/// Replace the template's image slot with `raster` and write the result to `output`.
///
/// The slot is the first `<image>` inside a `<g clip-path=...>`, or failing
/// that the first `<image>` anywhere.
pub fn embed_image(template: &Path, raster: &Path, output: &Path) -> PipelineResult<EmbedSummary> {
    if template == output {
        return Err(PipelineError::VectorParse {
            path: template.to_path_buf(),
            message: "refusing to overwrite the template".into(),
        });
    }

    let content = fs::read_to_string(template).map_err(|e| PipelineError::io(template, e))?;
    let bytes = fs::read(raster).map_err(|e| PipelineError::io(raster, e))?;
    let mime = sniff_mime(&bytes, raster)?;
    let uri = data_uri(mime, &bytes);

    let parse_err = |message: String| PipelineError::VectorParse {
        path: template.to_path_buf(),
        message,
    };

    let mut reader = NsReader::from_str(&content);
    let mut events: Vec<Event<'_>> = Vec::new();
    let mut open_clip_groups: Vec<bool> = Vec::new();
    let mut clip_slot: Option<Slot> = None;
    let mut any_slot: Option<Slot> = None;

    loop {
        let (ns, event) = reader
            .read_resolved_event()
            .map_err(|e| parse_err(format!("XML parse error: {e}")))?;
        let in_svg = is_namespace(&ns, SVG_NAMESPACE) || matches!(ns, ResolveResult::Unbound);

        match &event {
            Event::Eof => break,
            Event::Start(e) | Event::Empty(e) => {
                let is_start = matches!(event, Event::Start(_));
                let local = e.local_name();

                if in_svg && local.as_ref() == b"image" {
                    let href_key = e.attributes().flatten().find_map(|attr| {
                        let (attr_ns, attr_local) = reader.resolve_attribute(attr.key);
                        let href = attr_local.as_ref() == b"href"
                            && (is_namespace(&attr_ns, XLINK_NAMESPACE) || matches!(attr_ns, ResolveResult::Unbound));
                        href.then(|| String::from_utf8_lossy(attr.key.as_ref()).into_owned())
                    });
                    let slot = Slot { event_index: events.len(), href_key };
                    if clip_slot.is_none() && open_clip_groups.iter().any(|c| *c) {
                        clip_slot = Some(slot.clone());
                    }
                    if any_slot.is_none() {
                        any_slot = Some(slot);
                    }
                }

                if is_start {
                    open_clip_groups.push(in_svg && local.as_ref() == b"g" && has_clip_path(e));
                }
            }
            Event::End(_) => {
                open_clip_groups.pop();
            }
            _ => {}
        }
        events.push(event);
    }

    let clip_grouped = clip_slot.is_some();
    let slot = clip_slot
        .or(any_slot)
        .ok_or_else(|| PipelineError::NoImageSlot { path: template.to_path_buf() })?;
    debug!(index = slot.event_index, clip_grouped, href = ?slot.href_key, "Image slot located");

    let href_key = slot.href_key.as_deref().unwrap_or("href");
    let mut writer = Writer::new(Vec::with_capacity(content.len() + uri.len()));
    for (index, event) in events.into_iter().enumerate() {
        let event = if index == slot.event_index {
            match event {
                Event::Start(e) => Event::Start(with_href(&e, href_key, &uri).map_err(parse_err)?),
                Event::Empty(e) => Event::Empty(with_href(&e, href_key, &uri).map_err(parse_err)?),
                other => other,
            }
        } else {
            event
        };
        writer
            .write_event(event)
            .map_err(|e| parse_err(format!("XML write error: {e}")))?;
    }

    fs::write(output, writer.into_inner()).map_err(|e| PipelineError::io(output, e))?;
    info!(
        template = %template.display(),
        output = %output.display(),
        mime,
        clip_grouped,
        "Embedded raster into template"
    );

    Ok(EmbedSummary {
        clip_grouped,
        mime_type: mime.to_string(),
        payload_bytes: bytes.len(),
    })
}

/// Copy of `element` with `key` set to `value`, keeping attribute order.
fn with_href(element: &BytesStart<'_>, key: &str, value: &str) -> Result<BytesStart<'static>, String> {
    let name = String::from_utf8_lossy(element.name().as_ref()).into_owned();
    let mut out = BytesStart::new(name);
    let mut replaced = false;
    for attr in element.attributes() {
        let attr = attr.map_err(|e| format!("bad attribute on <image>: {e}"))?;
        if attr.key.as_ref() == key.as_bytes() {
            out.push_attribute((key, value));
            replaced = true;
        } else {
            out.push_attribute(attr);
        }
    }
    if !replaced {
        out.push_attribute((key, value));
    }
    Ok(out)
}
