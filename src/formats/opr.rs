//! OPR — a small Shift-JIS, line-oriented text side-file carrying
//! per-mesh rendering hints.
//!
//! Unlike the other four formats this isn't binary; it's closer to an INI
//! file, keyed by repeated `Mesh = "name"` / `MeshPart = "name"` headers.

use std::collections::HashMap;

use log::warn;

use crate::error::Result;

#[derive(Debug, Clone, Default)]
pub struct OprOverlay {
    pub additive_blending: bool,
    pub no_edge: bool,
    pub edge_color: Option<Vec<f32>>,
    pub edge_size: Option<f32>,
    pub uv_scroll: Option<(f32, f32)>,
}

#[derive(Debug, Clone, Default)]
pub struct OprFile {
    pub meshes: HashMap<String, OprOverlay>,
}

impl OprFile {
    pub fn get(&self, mesh_name: &str) -> Option<&OprOverlay> {
        self.meshes.get(mesh_name)
    }
}

fn strip_quotes(s: &str) -> &str {
    let s = s.trim();
    if s.len() >= 2 && s.starts_with('"') && s.ends_with('"') {
        &s[1..s.len() - 1]
    } else {
        s
    }
}

fn parse_paren_floats(s: &str) -> Vec<f32> {
    let s = s.trim();
    let inner = s.strip_prefix('(').and_then(|s| s.strip_suffix(')')).unwrap_or(s);
    inner
        .split(',')
        .filter_map(|tok| tok.trim().parse::<f32>().ok())
        .collect()
}

pub fn decode(buf: &[u8]) -> Result<OprFile> {
    let (text, _encoding, _had_errors) = encoding_rs::SHIFT_JIS.decode(buf);

    let mut file = OprFile::default();
    let mut current: Option<String> = None;

    for raw_line in text.lines() {
        let line = raw_line.trim();
        if line.is_empty() {
            continue;
        }
        let Some(eq) = line.find('=') else { continue };
        let key = line[..eq].trim();
        let value = line[eq + 1..].trim();

        if key == "Mesh" || key == "MeshPart" {
            let name = strip_quotes(value).to_string();
            file.meshes.entry(name.clone()).or_default();
            current = Some(name);
            continue;
        }

        let Some(name) = current.as_ref() else {
            continue; // lines before any Mesh/MeshPart header are ignored
        };
        let overlay = file.meshes.get_mut(name).expect("inserted on header");

        match key {
            "BlendMode" => {
                if strip_quotes(value) == "Add" {
                    overlay.additive_blending = true;
                }
            }
            "Edge" => {
                if value == "0" {
                    overlay.no_edge = true;
                }
            }
            "EdgeColor" => {
                overlay.edge_color = Some(parse_paren_floats(value));
            }
            "EdgeSize" => {
                if let Ok(v) = value.parse::<f32>() {
                    overlay.edge_size = Some(v);
                }
            }
            "UVScroll" => {
                let vals = parse_paren_floats(value);
                if vals.len() == 2 {
                    overlay.uv_scroll = Some((vals[0], vals[1]));
                }
            }
            other => {
                warn!("opr: mesh {:?} has unrecognized key {:?}", name, other);
            }
        }
    }

    Ok(file)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_recognized_keys() {
        let text = concat!(
            "Mesh = \"body\"\n",
            "BlendMode = \"Add\"\n",
            "Edge = 0\n",
            "EdgeColor = (1.0, 0.5, 0.0, 1.0)\n",
            "EdgeSize = 1.5\n",
            "UVScroll = (0.1, -0.2)\n",
        );
        let file = decode(text.as_bytes()).unwrap();
        let body = file.get("body").unwrap();
        assert!(body.additive_blending);
        assert!(body.no_edge);
        assert_eq!(body.edge_color.as_deref(), Some(&[1.0, 0.5, 0.0, 1.0][..]));
        assert_eq!(body.edge_size, Some(1.5));
        assert_eq!(body.uv_scroll, Some((0.1, -0.2)));
    }

    #[test]
    fn lines_before_any_header_are_ignored() {
        let text = "BlendMode = \"Add\"\nMesh = \"a\"\n";
        let file = decode(text.as_bytes()).unwrap();
        let a = file.get("a").unwrap();
        assert!(!a.additive_blending);
    }

    #[test]
    fn unknown_key_is_ignored_not_fatal() {
        let text = "Mesh = \"a\"\nWeirdKey = 42\n";
        let file = decode(text.as_bytes()).unwrap();
        assert!(file.get("a").is_some());
    }

    #[test]
    fn multiple_meshes_keep_separate_overlays() {
        let text = "Mesh = \"a\"\nEdge = 0\nMeshPart = \"b\"\nBlendMode = \"Add\"\n";
        let file = decode(text.as_bytes()).unwrap();
        assert!(file.get("a").unwrap().no_edge);
        assert!(!file.get("a").unwrap().additive_blending);
        assert!(file.get("b").unwrap().additive_blending);
    }
}
