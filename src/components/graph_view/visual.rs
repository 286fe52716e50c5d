//! Colors, per-type node visuals and the canvas theme.

/// RGBA color representation.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Color {
	pub r: u8,
	pub g: u8,
	pub b: u8,
	pub a: f64,
}

impl Color {
	pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
		Self { r, g, b, a: 1.0 }
	}

	pub const fn rgba(r: u8, g: u8, b: u8, a: f64) -> Self {
		Self { r, g, b, a }
	}

	pub fn with_alpha(self, a: f64) -> Self {
		Self { a, ..self }
	}

	/// Lighten the color by a factor (0.0 = unchanged, 1.0 = white)
	pub fn lighten(self, factor: f64) -> Self {
		let f = factor.clamp(0.0, 1.0);
		let up = |c: u8| (c as f64 + (255.0 - c as f64) * f) as u8;
		Self {
			r: up(self.r),
			g: up(self.g),
			b: up(self.b),
			a: self.a,
		}
	}

	/// Linear interpolation between two colors
	pub fn lerp(self, other: Color, t: f64) -> Self {
		let t = t.clamp(0.0, 1.0);
		let mix = |a: u8, b: u8| (a as f64 * (1.0 - t) + b as f64 * t) as u8;
		Self {
			r: mix(self.r, other.r),
			g: mix(self.g, other.g),
			b: mix(self.b, other.b),
			a: self.a * (1.0 - t) + other.a * t,
		}
	}

	pub fn to_css(self) -> String {
		if (self.a - 1.0).abs() < 0.001 {
			format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
		} else {
			format!("rgba({}, {}, {}, {})", self.r, self.g, self.b, self.a)
		}
	}
}

/// How one node type is drawn.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct NodeVisual {
	pub label: &'static str,
	/// Single character drawn inside the node.
	pub glyph: &'static str,
	pub color: Color,
	/// Radius in graph units.
	pub radius: f64,
}

const DOCUMENT: NodeVisual = NodeVisual {
	label: "Document",
	glyph: "\u{1F4C1}",
	color: Color::rgb(59, 130, 246),
	radius: 22.0,
};

const TAG: NodeVisual = NodeVisual {
	label: "Tag",
	glyph: "#",
	color: Color::rgb(107, 114, 128),
	radius: 14.0,
};

const VISUALS: &[(&str, NodeVisual)] = &[
	("document", DOCUMENT),
	(
		"article",
		NodeVisual {
			label: "Article",
			glyph: "\u{1F4C4}",
			color: Color::rgb(99, 102, 241),
			radius: 20.0,
		},
	),
	(
		"heading_section",
		NodeVisual {
			label: "Heading Section",
			glyph: "\u{00A7}",
			color: Color::rgb(16, 185, 129),
			radius: 18.0,
		},
	),
	(
		"paragraph",
		NodeVisual {
			label: "Paragraph",
			glyph: "\u{00B6}",
			color: Color::rgb(20, 184, 166),
			radius: 16.0,
		},
	),
	(
		"claim",
		NodeVisual {
			label: "Claim",
			glyph: "!",
			color: Color::rgb(245, 158, 11),
			radius: 16.0,
		},
	),
	(
		"quote",
		NodeVisual {
			label: "Quote",
			glyph: "\u{201C}",
			color: Color::rgb(168, 85, 247),
			radius: 16.0,
		},
	),
	(
		"question",
		NodeVisual {
			label: "Question",
			glyph: "?",
			color: Color::rgb(236, 72, 153),
			radius: 16.0,
		},
	),
	(
		"definition",
		NodeVisual {
			label: "Definition",
			glyph: "\u{2261}",
			color: Color::rgb(14, 165, 233),
			radius: 16.0,
		},
	),
	(
		"reference",
		NodeVisual {
			label: "Reference",
			glyph: "\u{2197}",
			color: Color::rgb(132, 204, 22),
			radius: 16.0,
		},
	),
	("tag", TAG),
	(
		"hyponym",
		NodeVisual {
			label: "Hyponym",
			glyph: "\u{2193}",
			color: Color::rgb(120, 113, 108),
			radius: 14.0,
		},
	),
	(
		"hypernym",
		NodeVisual {
			label: "Hypernym",
			glyph: "\u{2191}",
			color: Color::rgb(120, 113, 108),
			radius: 14.0,
		},
	),
];

/// Canonical form of a raw type tag: lower-cased, last `:` segment, aliases resolved.
///
/// `"Document:Article"` becomes `"article"`, `"doc"` becomes `"document"`.
pub fn normalize_type_label(raw: &str) -> String {
	let lower = raw.to_lowercase();
	let candidate = lower.split(':').rfind(|s| !s.is_empty()).unwrap_or("");
	match candidate {
		"doc" => "document".to_string(),
		"heading" | "section" => "heading_section".to_string(),
		other => other.to_string(),
	}
}

/// Visual for a raw type tag. Unknown metadata-ish types look like tags,
/// everything else unknown looks like a document.
pub fn visual_for(raw_type: &str) -> NodeVisual {
	let key = normalize_type_label(raw_type);
	if let Some((_, visual)) = VISUALS.iter().find(|(name, _)| *name == key) {
		return *visual;
	}
	if key == "metadata" {
		TAG
	} else {
		DOCUMENT
	}
}

/// Canvas colors.
#[derive(Clone, Debug)]
pub struct Theme {
	pub background: Color,
	pub background_secondary: Color,
	pub edge: Color,
	pub edge_highlight: Color,
	pub label: Color,
	pub hover_ring: Color,
	pub selection_ring: Color,
	/// Marker drawn on expanded nodes.
	pub expanded_marker: Color,
	/// Opacity of nodes excluded by the active filter.
	pub dimmed_alpha: f64,
	/// Below this zoom level labels are hidden.
	pub label_min_zoom: f64,
}

impl Default for Theme {
	fn default() -> Self {
		Self {
			background: Color::rgb(22, 27, 34),
			background_secondary: Color::rgb(30, 35, 42),
			edge: Color::rgba(140, 160, 180, 0.45),
			edge_highlight: Color::rgba(200, 215, 235, 0.9),
			label: Color::rgba(230, 237, 243, 0.9),
			hover_ring: Color::rgb(255, 255, 255),
			selection_ring: Color::rgb(250, 204, 21),
			expanded_marker: Color::rgb(250, 250, 250),
			dimmed_alpha: 0.15,
			label_min_zoom: 0.45,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn type_labels_normalize() {
		assert_eq!(normalize_type_label("Document:Article"), "article");
		assert_eq!(normalize_type_label("doc"), "document");
		assert_eq!(normalize_type_label("HEADING"), "heading_section");
		assert_eq!(normalize_type_label("kb:section"), "heading_section");
		assert_eq!(normalize_type_label("tag:"), "tag");
		assert_eq!(normalize_type_label(""), "");
	}

	#[test]
	fn unknown_types_fall_back_to_document() {
		assert_eq!(visual_for("widget"), DOCUMENT);
		assert_eq!(visual_for(""), DOCUMENT);
		assert_eq!(visual_for("metadata"), TAG);
		assert_eq!(visual_for("x:heading").label, "Heading Section");
	}

	#[test]
	fn css_output() {
		assert_eq!(Color::rgb(255, 0, 16).to_css(), "#ff0010");
		assert_eq!(Color::rgb(0, 0, 0).with_alpha(0.5).to_css(), "rgba(0, 0, 0, 0.5)");
		assert_eq!(Color::rgb(0, 0, 0).lighten(1.0), Color::rgb(255, 255, 255));
	}
}
