//! # Report rendering
//!
//! Turns a [`SummarySnapshot`] into the two run artifacts:
//!
//! - `<name>-summary.html`: human-readable report driven by a [`ReportTemplate`]
//! - `<name>-summary.json`: the snapshot itself, pretty-printed
//!
//! Rendering is pure. The generation timestamp is an input, so the same
//! snapshot and timestamp always produce byte-identical output.

mod template;

pub use template::{
    Card, Field, Format, Grade, MetricPath, Recommendation, ReportTemplate, Row, Section, Stat,
    Tier, Verdict, MISSING,
};

use std::fs;
use std::path::{Path, PathBuf};

use tracing::info;

use crate::error::Result;
use crate::summary::SummarySnapshot;

const BASE_STYLES: &[&str] = &[
    "body { font-family: Arial, sans-serif; margin: 40px; }",
    ".metric { background: #f5f5f5; padding: 10px; margin: 10px 0; border-radius: 5px; }",
    ".pass { color: green; }",
    ".fail { color: red; }",
];

const LAYOUT_STYLES: &[&str] = &[
    "h1 { color: #333; }",
    "table { border-collapse: collapse; width: 100%; }",
    "th, td { border: 1px solid #ddd; padding: 8px; text-align: left; }",
    "th { background-color: #f2f2f2; }",
];

/// Rendered artifacts of one run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedReport {
    pub html: String,
    pub json: String,
}

/// Where [`RenderedReport::write`] put the artifacts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactPaths {
    pub html: PathBuf,
    pub json: PathBuf,
}

impl RenderedReport {
    /// Write `<name>-summary.html` and `<name>-summary.json` under `dir`
    pub fn write(&self, dir: &Path, name: &str) -> Result<ArtifactPaths> {
        fs::create_dir_all(dir)?;

        let paths = ArtifactPaths {
            html: dir.join(format!("{}-summary.html", name)),
            json: dir.join(format!("{}-summary.json", name)),
        };
        fs::write(&paths.html, &self.html)?;
        fs::write(&paths.json, &self.json)?;

        info!(
            html = %paths.html.display(),
            json = %paths.json.display(),
            "Report written"
        );
        Ok(paths)
    }
}

/// Render both artifacts
pub fn render(
    template: &ReportTemplate,
    snapshot: &SummarySnapshot,
    generated_at: &str,
) -> Result<RenderedReport> {
    Ok(RenderedReport {
        html: render_html(template, snapshot, generated_at),
        json: snapshot.to_json_pretty()?,
    })
}

/// Render the HTML document
pub fn render_html(template: &ReportTemplate, snapshot: &SummarySnapshot, generated_at: &str) -> String {
    let styles = BASE_STYLES
        .iter()
        .chain(template.extra_styles)
        .chain(LAYOUT_STYLES)
        .copied()
        .collect::<Vec<_>>()
        .join("\n        ");

    let sections: String = template
        .sections
        .iter()
        .map(|section| render_section(section, snapshot))
        .collect();

    format!(
        r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="utf-8">
    <title>{title}</title>
    <style>
        {styles}
    </style>
</head>
<body>
    <h1>{heading}</h1>
    <p>{generated_label}: {generated_at}</p>
{sections}</body>
</html>
"#,
        title = html_escape(template.title),
        styles = styles,
        heading = html_escape(template.heading),
        generated_label = html_escape(template.generated_label),
        generated_at = html_escape(generated_at),
        sections = sections,
    )
}

fn render_section(section: &Section, snapshot: &SummarySnapshot) -> String {
    match section {
        Section::Cards { heading, cards } => {
            let body: String = cards.iter().map(|card| render_card(card, snapshot)).collect();
            format!("\n    <h2>{}</h2>\n{}", html_escape(heading), body)
        }
        Section::Table {
            heading,
            headers,
            rows,
        } => {
            let header_cells: String = headers
                .iter()
                .map(|h| format!("<th>{}</th>", html_escape(h)))
                .collect();
            let body: String = rows.iter().map(|row| render_row(row, snapshot)).collect();
            format!(
                "\n    <h2>{}</h2>\n    <table>\n        <tr>{}</tr>\n{}    </table>\n",
                html_escape(heading),
                header_cells,
                body
            )
        }
        Section::Thresholds { heading } => {
            let body: String = snapshot
                .thresholds
                .iter()
                .map(|(name, result)| {
                    let (class, glyph) = if result.ok {
                        ("pass", "✅")
                    } else {
                        ("fail", "❌")
                    };
                    format!(
                        "    <div class=\"metric {}\">{} {}</div>\n",
                        class,
                        glyph,
                        html_escape(name)
                    )
                })
                .collect();
            format!("\n    <h2>{}</h2>\n{}", html_escape(heading), body)
        }
        Section::Notice {
            heading,
            class,
            lines,
        } => {
            let text = lines
                .iter()
                .map(|line| html_escape(line))
                .collect::<Vec<_>>()
                .join("<br>\n        ");
            format!(
                "\n    <h2>{}</h2>\n    <div class=\"metric {}\">\n        {}\n    </div>\n",
                html_escape(heading),
                class,
                text
            )
        }
        Section::Recommendations { heading, items } => {
            let body: String = items
                .iter()
                .map(|item| {
                    format!(
                        "        <li>{}: {}</li>\n",
                        html_escape(item.label),
                        html_escape(item.grade.verdict(snapshot).text)
                    )
                })
                .collect();
            format!(
                "\n    <h2>{}</h2>\n    <ul>\n{}    </ul>\n",
                html_escape(heading),
                body
            )
        }
    }
}

fn render_card(card: &Card, snapshot: &SummarySnapshot) -> String {
    let value = html_escape(&card.value.render(snapshot));
    match &card.grade {
        Some(grade) => format!(
            "    <div class=\"metric\">\n        <strong>{}:</strong>\n        <span class=\"{}\">{}</span>\n    </div>\n",
            html_escape(card.label),
            grade.verdict(snapshot).class,
            value
        ),
        None => format!(
            "    <div class=\"metric\">\n        <strong>{}:</strong> {}\n    </div>\n",
            html_escape(card.label),
            value
        ),
    }
}

fn render_row(row: &Row, snapshot: &SummarySnapshot) -> String {
    let status = row
        .grade
        .as_ref()
        .map(|grade| {
            let verdict = grade.verdict(snapshot);
            format!(
                "<td class=\"{}\">{}</td>",
                verdict.class,
                html_escape(verdict.text)
            )
        })
        .unwrap_or_default();
    format!(
        "        <tr><td>{}</td><td>{}</td>{}</tr>\n",
        html_escape(row.label),
        html_escape(&row.value.render(snapshot)),
        status
    )
}

fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
