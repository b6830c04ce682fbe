use serde::Serialize;

const EXTINF: &str = "#EXTINF:";
const UNTITLED: &str = "Untitled";

/// a playable entry of an m3u playlist
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Channel {
    pub title: String,
    pub url: String,
}

/// pairs each `#EXTINF:<duration>,<title>` line with the next non-comment line
pub fn parse(body: &str) -> Vec<Channel> {
    let mut channels = Vec::new();
    let mut title: Option<String> = None;

    for line in body.split('\n').map(str::trim) {
        if let Some(info) = line.strip_prefix(EXTINF) {
            // an empty name after the comma drops the entry
            title = match info.split_once(',') {
                None => Some(UNTITLED.to_string()),
                Some((_, name)) => {
                    let name = name.trim();
                    (!name.is_empty()).then(|| name.to_string())
                }
            };
        } else if !line.is_empty() && !line.starts_with('#') {
            if let Some(title) = title.take() {
                channels.push(Channel {
                    title,
                    url: line.to_string(),
                });
            }
        }
    }

    channels
}
