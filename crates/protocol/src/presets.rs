//! Ready-made activities and buttons for common situations.

use crate::activity::{Activity, Button, unix_now_secs};

pub fn now_playing(song: &str, artist: Option<&str>) -> Activity {
    Activity {
        details: Some(format!("Listening to {song}")),
        state: artist.map(|a| format!("by {a}")),
        large_image_key: Some("music".into()),
        large_image_text: Some("Now Playing".into()),
        ..Activity::default()
    }
}

pub fn in_lobby(game: &str) -> Activity {
    Activity {
        details: Some("In Lobby".into()),
        state: Some(format!("Playing {game}")),
        large_image_key: Some("lobby".into()),
        large_image_text: Some("Waiting for players".into()),
        ..Activity::default()
    }
}

pub fn downloading(file: &str, percent: u8) -> Activity {
    Activity {
        details: Some(format!("Downloading {file}")),
        state: Some(format!("Progress: {percent}%")),
        large_image_key: Some("download".into()),
        large_image_text: Some("Downloading".into()),
        ..Activity::default()
    }
}

/// A countdown of `seconds` starting now.
pub fn timer(label: &str, seconds: f64) -> Activity {
    let start = unix_now_secs();
    Activity {
        details: Some(label.into()),
        start_timestamp: Some(start),
        end_timestamp: Some(start + seconds),
        large_image_key: Some("timer".into()),
        large_image_text: Some("Timer".into()),
        ..Activity::default()
    }
}

pub fn join_game(url: &str) -> Button {
    Button::new("Join Game", url)
}

pub fn watch_stream(url: &str) -> Button {
    Button::new("Watch Stream", url)
}

pub fn custom_button(label: &str, url: &str) -> Button {
    Button::new(label, url)
}
