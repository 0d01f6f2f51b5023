use crate::db::{ComplaintFilter, ReportSubject, StatusCount, Store, StoreResult};
use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct Engagement {
    pub complaints: Vec<StatusCount>,
    pub petitions: Vec<StatusCount>,
    pub polls: Vec<StatusCount>,
}

pub async fn engagement(store: &dyn Store) -> StoreResult<Engagement> {
    let (complaints, petitions, polls) = futures::try_join!(
        store.status_counts(ReportSubject::Complaints),
        store.status_counts(ReportSubject::Petitions),
        store.status_counts(ReportSubject::Polls),
    )?;
    Ok(Engagement {
        complaints,
        petitions,
        polls,
    })
}

/// One line of the exported report.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ReportRow {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub title: String,
    pub category: String,
    pub status: String,
    pub location: String,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
}

pub async fn report_rows(store: &dyn Store) -> StoreResult<Vec<ReportRow>> {
    let all_complaints = ComplaintFilter::default();
    let ((complaints, _), petitions, polls) = futures::try_join!(
        store.list_complaints(&all_complaints),
        store.list_petitions(None),
        store.list_polls(None),
    )?;

    let mut rows = Vec::with_capacity(complaints.len() + petitions.len() + polls.len());
    rows.extend(complaints.into_iter().map(|c| ReportRow {
        kind: "Complaint",
        title: c.title,
        category: c.category.as_str().to_string(),
        status: c.status.as_str().to_string(),
        location: c.location.city.unwrap_or_else(|| "N/A".to_string()),
        created_at: c.created_at,
    }));
    rows.extend(petitions.into_iter().map(|p| ReportRow {
        kind: "Petition",
        title: p.title,
        category: p.category,
        status: p.status.as_str().to_string(),
        location: p.location,
        created_at: p.created_at,
    }));
    rows.extend(polls.into_iter().map(|p| ReportRow {
        kind: "Poll",
        title: p.title,
        category: "Uncategorized".to_string(),
        status: p.status.as_str().to_string(),
        location: if p.target_location.is_empty() {
            "N/A".to_string()
        } else {
            p.target_location
        },
        created_at: p.created_at,
    }));
    Ok(rows)
}

pub fn to_csv(rows: &[ReportRow]) -> Result<Vec<u8>, csv::Error> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    if rows.is_empty() {
        writer.write_record(["type", "title", "category", "status", "location", "createdAt"])?;
    }
    for row in rows {
        writer.serialize(row)?;
    }
    writer.into_inner().map_err(|e| e.into_error().into())
}

const PAGE_WIDTH: f32 = 612.0;
const PAGE_HEIGHT: f32 = 792.0;
const MARGIN: f32 = 50.0;
/// Helvetica averages about half an em per glyph.
const GLYPH_EM: f32 = 0.5;

struct Line {
    size: f32,
    text: String,
}

impl Line {
    fn new(size: f32, text: impl Into<String>) -> Self {
        Line { size, text: text.into() }
    }
}

/// Renders the report as a plain PDF 1.4 document using the built-in Helvetica font.
pub fn to_pdf(rows: &[ReportRow]) -> Vec<u8> {
    let mut lines = vec![Line::new(20.0, "Civic Engagement Report"), Line::new(12.0, "")];
    for (heading, kind) in [("Complaints", "Complaint"), ("Petitions", "Petition"), ("Polls", "Poll")] {
        lines.push(Line::new(14.0, heading));
        let mut any = false;
        for row in rows.iter().filter(|r| r.kind == kind) {
            any = true;
            let entry = format!("- {} ({}) - {} - {}", row.title, row.status, row.category, row.location);
            for (i, part) in wrap(&entry, line_capacity(11.0) - 2).into_iter().enumerate() {
                let text = if i == 0 { part } else { format!("  {part}") };
                lines.push(Line::new(11.0, text));
            }
        }
        if !any {
            lines.push(Line::new(11.0, "No records"));
        }
        lines.push(Line::new(11.0, ""));
    }

    let pages = paginate(&lines);
    write_document(&pages)
}

fn line_capacity(size: f32) -> usize {
    ((PAGE_WIDTH - 2.0 * MARGIN) / (size * GLYPH_EM)) as usize
}

/// Breaks `text` at spaces so no line exceeds `width` characters; longer words are split.
fn wrap(text: &str, width: usize) -> Vec<String> {
    let width = width.max(1);
    let mut lines = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for word in text.split(' ').filter(|w| !w.is_empty()) {
        let mut chars: Vec<char> = word.chars().collect();
        while chars.len() > width {
            if current_len > 0 {
                lines.push(std::mem::take(&mut current));
                current_len = 0;
            }
            lines.push(chars.drain(..width).collect());
        }
        if chars.is_empty() {
            continue;
        }
        let needed = if current_len == 0 { chars.len() } else { current_len + 1 + chars.len() };
        if needed > width {
            lines.push(std::mem::take(&mut current));
            current_len = 0;
        }
        if current_len > 0 {
            current.push(' ');
            current_len += 1;
        }
        current.extend(chars.iter());
        current_len += chars.len();
    }
    if current_len > 0 || lines.is_empty() {
        lines.push(current);
    }
    lines
}

fn paginate(lines: &[Line]) -> Vec<String> {
    let mut pages = Vec::new();
    let mut content = String::new();
    let mut y = PAGE_HEIGHT - MARGIN;

    for line in lines {
        let leading = line.size * 1.4;
        if y - leading < MARGIN {
            pages.push(std::mem::take(&mut content));
            y = PAGE_HEIGHT - MARGIN;
        }
        y -= leading;
        if line.text.is_empty() {
            continue;
        }
        let x = if line.size >= 20.0 {
            let width = line.text.chars().count() as f32 * line.size * GLYPH_EM;
            ((PAGE_WIDTH - width) / 2.0).max(MARGIN)
        } else {
            MARGIN
        };
        content.push_str(&format!(
            "BT /F1 {} Tf {:.1} {:.1} Td ({}) Tj ET\n",
            line.size,
            x,
            y,
            escape_text(&line.text)
        ));
    }
    pages.push(content);
    pages
}

/// Maps a character to its byte in the font's WinAnsiEncoding.
fn win_ansi(ch: char) -> Option<u8> {
    let code = match ch {
        ' '..='~' | '\u{a0}'..='\u{ff}' => return u8::try_from(u32::from(ch)).ok(),
        '€' => 0x80,
        '‚' => 0x82,
        'ƒ' => 0x83,
        '„' => 0x84,
        '…' => 0x85,
        '†' => 0x86,
        '‡' => 0x87,
        'ˆ' => 0x88,
        '‰' => 0x89,
        'Š' => 0x8a,
        '‹' => 0x8b,
        'Œ' => 0x8c,
        'Ž' => 0x8e,
        '\u{2018}' => 0x91,
        '\u{2019}' => 0x92,
        '\u{201c}' => 0x93,
        '\u{201d}' => 0x94,
        '•' => 0x95,
        '–' => 0x96,
        '—' => 0x97,
        '˜' => 0x98,
        '™' => 0x99,
        'š' => 0x9a,
        '›' => 0x9b,
        'œ' => 0x9c,
        'ž' => 0x9e,
        'Ÿ' => 0x9f,
        _ => return None,
    };
    Some(code)
}

/// Escapes a line for a PDF string literal. Bytes outside printable ASCII are
/// written as octal escapes so the content stream stays 7-bit.
fn escape_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match win_ansi(ch) {
            Some(b'(' | b')' | b'\\') => {
                out.push('\\');
                out.push(ch);
            }
            Some(byte) if byte.is_ascii() => out.push(char::from(byte)),
            Some(byte) => out.push_str(&format!("\\{byte:03o}")),
            None => out.push('?'),
        }
    }
    out
}

fn write_document(pages: &[String]) -> Vec<u8> {
    // 1 catalog, 2 page tree, 3 font, then a (page, content) pair per page.
    let page_obj = |i: usize| 4 + 2 * i;
    let mut objects: Vec<String> = Vec::with_capacity(3 + 2 * pages.len());

    objects.push("<< /Type /Catalog /Pages 2 0 R >>".into());
    let kids = (0..pages.len())
        .map(|i| format!("{} 0 R", page_obj(i)))
        .collect::<Vec<_>>()
        .join(" ");
    objects.push(format!("<< /Type /Pages /Kids [{kids}] /Count {} >>", pages.len()));
    objects.push("<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica /Encoding /WinAnsiEncoding >>".into());

    for (i, content) in pages.iter().enumerate() {
        objects.push(format!(
            "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 {PAGE_WIDTH} {PAGE_HEIGHT}] \
             /Resources << /Font << /F1 3 0 R >> >> /Contents {} 0 R >>",
            page_obj(i) + 1
        ));
        objects.push(format!(
            "<< /Length {} >>\nstream\n{content}endstream",
            content.len()
        ));
    }

    let mut out: Vec<u8> = b"%PDF-1.4\n".to_vec();
    let mut offsets = Vec::with_capacity(objects.len());
    for (n, body) in objects.iter().enumerate() {
        offsets.push(out.len());
        out.extend_from_slice(format!("{} 0 obj\n{body}\nendobj\n", n + 1).as_bytes());
    }

    let xref_at = out.len();
    out.extend_from_slice(format!("xref\n0 {}\n", objects.len() + 1).as_bytes());
    out.extend_from_slice(b"0000000000 65535 f \n");
    for offset in offsets {
        out.extend_from_slice(format!("{offset:010} 00000 n \n").as_bytes());
    }
    out.extend_from_slice(
        format!(
            "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{xref_at}\n%%EOF\n",
            objects.len() + 1
        )
        .as_bytes(),
    );
    out
}
