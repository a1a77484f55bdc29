use std::path::Path;

use chrono::{DateTime, Local, Utc};
use serde::Serialize;
use tokio::fs;
use tracing::debug;

use crate::error::ShareError;

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

const STYLE: &str = "body{font-family:sans-serif;margin:2em}\
table{border-collapse:collapse}\
td,th{padding:.2em 1.5em .2em 0;text-align:left}\
td.size{text-align:right}\
tr.dir a{font-weight:bold}";

#[derive(Debug, Clone, Serialize)]
pub struct ListingEntry {
    pub name: String,
    pub is_dir: bool,
    /// `None` for directories.
    pub size: Option<u64>,
    pub modified: Option<DateTime<Utc>>,
    pub href: String,
}

/// One level of a shared directory, read fresh for every request.
#[derive(Debug, Clone, Serialize)]
pub struct DirectoryListing {
    pub path: String,
    #[serde(skip)]
    pub parent_href: Option<String>,
    pub entries: Vec<ListingEntry>,
}

impl DirectoryListing {
    /// Reads the entries of `dir`, which is served at `/{relative}`. Entries keep the
    /// order the directory read returns them in.
    pub async fn read(dir: &Path, relative: &str) -> Result<Self, ShareError> {
        let mut reader = fs::read_dir(dir)
            .await
            .map_err(|err| ShareError::Internal(format!("read dir /{relative}: {err}")))?;

        let mut entries = Vec::new();
        while let Some(entry) = reader
            .next_entry()
            .await
            .map_err(|err| ShareError::Internal(format!("read dir /{relative}: {err}")))?
        {
            let name = entry.file_name().to_string_lossy().into_owned();
            let metadata = match fs::metadata(entry.path()).await {
                Ok(metadata) => metadata,
                Err(err) => {
                    debug!("skipping listing entry {name}: {err}");
                    continue;
                }
            };

            let is_dir = metadata.is_dir();
            entries.push(ListingEntry {
                href: href_for(&join_relative(relative, &name)),
                size: (!is_dir).then_some(metadata.len()),
                modified: metadata.modified().ok().map(DateTime::<Utc>::from),
                is_dir,
                name,
            });
        }

        let parent_href = (!relative.is_empty())
            .then(|| href_for(relative.rsplit_once('/').map_or("", |(parent, _)| parent)));

        Ok(Self {
            path: format!("/{relative}"),
            parent_href,
            entries,
        })
    }

    pub fn render_html(&self) -> String {
        let title = escape_html(&self.path);
        let mut html = String::with_capacity(512 + self.entries.len() * 160);

        html.push_str("<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n");
        html.push_str(&format!("<title>Index of {title}</title>\n"));
        html.push_str("<link rel=\"icon\" href=\"/~favicon.ico\">\n");
        html.push_str(&format!("<style>{STYLE}</style>\n</head>\n<body>\n"));
        html.push_str(&format!("<h1>Index of {title}</h1>\n<table>\n"));
        html.push_str("<tr><th>Name</th><th>Size</th><th>Modified</th></tr>\n");

        if let Some(parent) = &self.parent_href {
            html.push_str(&format!(
                "<tr class=\"dir\"><td><a href=\"{}\">../</a></td><td class=\"size\">-</td><td></td></tr>\n",
                escape_html(parent)
            ));
        }

        for entry in &self.entries {
            let (class, suffix) = if entry.is_dir { ("dir", "/") } else { ("file", "") };
            let size = entry
                .size
                .map_or_else(|| "-".to_string(), |size| size.to_string());
            let modified = entry
                .modified
                .map(|t| t.with_timezone(&Local).format(TIME_FORMAT).to_string())
                .unwrap_or_default();
            html.push_str(&format!(
                "<tr class=\"{class}\"><td><a href=\"{}\">{}{suffix}</a></td><td class=\"size\">{size}</td><td>{modified}</td></tr>\n",
                escape_html(&entry.href),
                escape_html(&entry.name),
            ));
        }

        html.push_str("</table>\n</body>\n</html>\n");
        html
    }
}

fn join_relative(relative: &str, name: &str) -> String {
    if relative.is_empty() {
        name.to_string()
    } else {
        format!("{relative}/{name}")
    }
}

/// Absolute link for a root-relative path, one encoded segment at a time.
fn href_for(relative: &str) -> String {
    let encoded = relative
        .split('/')
        .filter(|segment| !segment.is_empty())
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/");
    format!("/{encoded}")
}

fn escape_html(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
