//! Manifest editor dispatch.
//!
//! The manifest is read into an [`Element`] whose attribute keys are the
//! qualified names written in the source (`android:name`, `package`), in
//! source order. Namespace declarations stay on the elements that made
//! them, so a document nobody edits is written back unchanged.

use crate::callbacks::{CallbackRef, CallbackRegistry};
use crate::error::{SpliceError, SpliceResult};
use std::fs::{self, File};
use std::io::{BufReader, Read};
use std::path::Path;
use tracing::{debug, info};
use xml::reader::{ParserConfig, XmlEvent};
use xmltree::{EmitterConfig, Element, XMLNode};

/// Manifest file name inside the manifest directory.
pub const MANIFEST_FILE: &str = "AndroidManifest.xml";

/// Applies `editors` in order to `<manifest_dir>/AndroidManifest.xml`.
///
/// Every editor is resolved before the document is touched. Returns the
/// number of manifests rewritten (0 or 1).
pub fn edit_manifest(
    manifest_dir: Option<&Path>,
    editors: &[CallbackRef],
    registry: &CallbackRegistry,
) -> SpliceResult<usize> {
    if editors.is_empty() {
        return Ok(0);
    }
    let resolved = editors
        .iter()
        .map(|reference| registry.manifest_editor(reference).map(|e| (reference, e)))
        .collect::<SpliceResult<Vec<_>>>()?;

    let Some(dir) = manifest_dir else {
        debug!("no manifest directory, skipping editors");
        return Ok(0);
    };
    let path = dir.join(MANIFEST_FILE);
    if !path.is_file() {
        debug!(path = %path.display(), "manifest absent, skipping editors");
        return Ok(0);
    }

    let xml_err = |message: String| SpliceError::Xml {
        path: path.clone(),
        message,
    };
    let mut document =
        parse_manifest(BufReader::new(File::open(&path)?)).map_err(|e| xml_err(e.to_string()))?;
    for (reference, editor) in resolved {
        editor(&mut document).map_err(|e| SpliceError::external_callback(reference, e))?;
        debug!(editor = %reference, "applied manifest editor");
    }

    let out = write_manifest(&document).map_err(|e| xml_err(e.to_string()))?;
    fs::write(&path, out)?;
    info!(editors = editors.len(), path = %path.display(), "edited manifest");
    Ok(1)
}

/// Reads a manifest, keeping qualified attribute names, attribute order,
/// comments and whitespace.
pub fn parse_manifest<R: Read>(source: R) -> Result<Element, xml::reader::Error> {
    let reader = ParserConfig::new()
        .ignore_comments(false)
        .create_reader(source);
    let mut open: Vec<Element> = Vec::new();
    for event in reader {
        match event? {
            XmlEvent::StartElement {
                name,
                attributes,
                namespace,
            } => {
                let mut element = Element::new(&name.local_name);
                element.prefix = name.prefix;
                element.namespace = name.namespace;
                if !namespace.is_essentially_empty() {
                    element.namespaces = Some(namespace);
                }
                for attribute in attributes {
                    let key = match attribute.name.prefix {
                        Some(prefix) => format!("{prefix}:{}", attribute.name.local_name),
                        None => attribute.name.local_name,
                    };
                    element.attributes.insert(key, attribute.value);
                }
                open.push(element);
            }
            XmlEvent::EndElement { .. } => {
                let Some(element) = open.pop() else {
                    continue;
                };
                match open.last_mut() {
                    Some(parent) => parent.children.push(XMLNode::Element(element)),
                    None => return Ok(element),
                }
            }
            XmlEvent::Characters(text) | XmlEvent::Whitespace(text) => {
                if let Some(parent) = open.last_mut() {
                    parent.children.push(XMLNode::Text(text));
                }
            }
            XmlEvent::CData(text) => {
                if let Some(parent) = open.last_mut() {
                    parent.children.push(XMLNode::CData(text));
                }
            }
            XmlEvent::Comment(text) => {
                if let Some(parent) = open.last_mut() {
                    parent.children.push(XMLNode::Comment(text));
                }
            }
            XmlEvent::ProcessingInstruction { name, data } => {
                if let Some(parent) = open.last_mut() {
                    parent
                        .children
                        .push(XMLNode::ProcessingInstruction(name, data));
                }
            }
            _ => {}
        }
    }
    Err(xml::reader::Error::from((
        &xml::common::TextPosition::new(),
        "document has no root element",
    )))
}

/// Serialises a manifest with an XML declaration and compact empty tags.
pub fn write_manifest(document: &Element) -> Result<Vec<u8>, xmltree::Error> {
    let mut out = Vec::new();
    document.write_with_config(&mut out, EmitterConfig::new().pad_self_closing(false))?;
    Ok(out)
}
