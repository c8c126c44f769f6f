//! Session description parsing
//!
//! Splits a session description into a header and ordered media sections
//! while keeping every line untouched, so that [`SessionDescription::serialize`]
//! reproduces the input exactly. Each section records its media kind, the
//! media stream ids announced by its `a=msid:` lines and its negotiated mid.
// Copyright 2025 Francisco F. Pinochet
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.


use std::collections::HashMap;
use std::fmt;

const SECTION_PREFIX: &str = "m=";
const MSID_PREFIX: &str = "a=msid:";
const MID_PREFIX: &str = "a=mid:";

/// Media kind announced by a section's `m=` line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SectionKind {
    Audio,
    Video,
    Text,
    Application,
    Message,
    /// Kinds this parser does not know yet
    Unknown,
}

impl SectionKind {
    fn from_media_line(line: &str) -> Self {
        let media = line[SECTION_PREFIX.len()..]
            .split_whitespace()
            .next()
            .unwrap_or_default();
        match media {
            "audio" => SectionKind::Audio,
            "video" => SectionKind::Video,
            "text" => SectionKind::Text,
            "application" => SectionKind::Application,
            "message" => SectionKind::Message,
            _ => SectionKind::Unknown,
        }
    }
}

/// One media section, from its `m=` line up to the next one
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SdpSection {
    lines: Vec<String>,
    kind: SectionKind,
    media_stream_ids: Vec<String>,
    track_id: Option<String>,
    mid: Option<String>,
}

impl SdpSection {
    fn new() -> Self {
        Self {
            lines: Vec::new(),
            kind: SectionKind::Unknown,
            media_stream_ids: Vec::new(),
            track_id: None,
            mid: None,
        }
    }

    fn add_line(&mut self, line: &str) {
        if line.starts_with(SECTION_PREFIX) {
            self.kind = SectionKind::from_media_line(line);
        } else if let Some(info) = line.strip_prefix(MSID_PREFIX) {
            let mut ids = info.split_whitespace();
            if let Some(stream_id) = ids.next() {
                self.media_stream_ids.push(stream_id.to_string());
                self.track_id = ids.next().map(str::to_string);
            }
        } else if let Some(mid) = line.strip_prefix(MID_PREFIX) {
            self.mid = Some(mid.trim().to_string());
        }

        self.lines.push(line.to_string());
    }

    pub fn kind(&self) -> SectionKind {
        self.kind
    }

    /// Media stream ids in announcement order
    pub fn media_stream_ids(&self) -> &[String] {
        &self.media_stream_ids
    }

    /// Track id of the last `a=msid:` line, if it carried one
    pub fn track_id(&self) -> Option<&str> {
        self.track_id.as_deref()
    }

    pub fn mid(&self) -> Option<&str> {
        self.mid.as_deref()
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }
}

/// Parsed session description
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionDescription {
    header: Vec<String>,
    sections: Vec<SdpSection>,
}

impl SessionDescription {
    /// Parse a session description. Lines are split on `\n` only so that
    /// `\r\n` terminated input survives a round trip.
    pub fn parse(text: &str) -> Self {
        let mut header = Vec::new();
        let mut sections: Vec<SdpSection> = Vec::new();

        for line in text.split('\n') {
            if line.starts_with(SECTION_PREFIX) {
                sections.push(SdpSection::new());
            }
            match sections.last_mut() {
                Some(section) => section.add_line(line),
                None => header.push(line.to_string()),
            }
        }

        Self { header, sections }
    }

    pub fn header(&self) -> &[String] {
        &self.header
    }

    /// Sections in document order
    pub fn sections(&self) -> &[SdpSection] {
        &self.sections
    }

    /// Map from media stream id to the section announcing it. A stream
    /// announced by several sections maps to the last one.
    pub fn sections_by_stream_id(&self) -> HashMap<&str, &SdpSection> {
        let mut result = HashMap::new();
        for section in &self.sections {
            for stream_id in &section.media_stream_ids {
                result.insert(stream_id.as_str(), section);
            }
        }
        result
    }

    pub fn section_with_mid(&self, mid: &str) -> Option<&SdpSection> {
        self.sections
            .iter()
            .find(|section| section.mid.as_deref() == Some(mid))
    }

    /// Reassemble the description exactly as it was parsed
    pub fn serialize(&self) -> String {
        let mut lines: Vec<&str> = self.header.iter().map(String::as_str).collect();
        for section in &self.sections {
            lines.extend(section.lines.iter().map(String::as_str));
        }
        lines.join("\n")
    }
}

impl fmt::Display for SessionDescription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.serialize())
    }
}
