use std::sync::LazyLock;

use regex::Regex;
use unicode_normalization::UnicodeNormalization;

use crate::models::song::SongInfo;

static WS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

const MAX_STEM_CHARS: usize = 160;

/// Makes one path component safe across platforms: NFC-normalized,
/// whitespace collapsed, reserved characters replaced, trailing dot and
/// space stripped.
pub fn sanitize_component(name: &str) -> String {
    let name: String = name.nfc().collect();
    let name = WS_RE.replace_all(name.trim(), " ");

    let mut result = String::with_capacity(name.len());
    for c in name.chars().take(MAX_STEM_CHARS) {
        match c {
            '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*' => result.push('_'),
            c if c.is_control() => {}
            c => result.push(c),
        }
    }

    result.trim_end_matches([' ', '.']).to_string()
}

/// Final audio file name for a song. The id suffix keeps distinct songs
/// with colliding titles apart and makes the path derivable from identity.
pub fn song_file_name(song: &SongInfo, extension: &str) -> String {
    let stem = sanitize_component(&format!("{} - {}", song.artist, song.name));
    format!("{} [{}].{}", stem, song.id, extension)
}

pub fn cover_file_name(song_id: u64) -> String {
    format!("{}.jpg", song_id)
}

/// In-flight transfers write here; only a verified transfer is renamed
/// onto the final name.
pub fn part_file_name(file_name: &str) -> String {
    format!("{}.part", file_name)
}
