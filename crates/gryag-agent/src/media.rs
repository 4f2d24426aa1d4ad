//! Inline-media capping (spec.md §4.3): before a request goes out, total
//! inline items and total inline videos are bounded. Overflow drops the
//! oldest media from history first — never from the current turn — and
//! replaces the dropped part with a text placeholder.

use crate::provider::{placeholder_for, Part, Turn};

pub const DEFAULT_MAX_INLINE_ITEMS: usize = 28;
pub const DEFAULT_MAX_INLINE_VIDEOS: usize = 1;

/// Caps inline media across `history`, keeping the most recent items and
/// replacing dropped ones in place so turn ordering and indices are stable.
/// The last element of `history` is treated as the current turn and is
/// never touched.
pub fn cap_inline_media(history: &mut [Turn], max_items: usize, max_videos: usize) {
    if history.is_empty() {
        return;
    }
    let current_turn_idx = history.len() - 1;

    let mut media_positions: Vec<(usize, usize, bool)> = Vec::new();
    for (turn_idx, turn) in history.iter().enumerate() {
        if turn_idx == current_turn_idx {
            continue;
        }
        for (part_idx, part) in turn.parts.iter().enumerate() {
            if part.is_media() {
                media_positions.push((turn_idx, part_idx, part.is_video()));
            }
        }
    }

    let total_items = media_positions.len();
    let total_videos = media_positions.iter().filter(|(_, _, is_video)| *is_video).count();

    let mut items_over = total_items.saturating_sub(max_items);
    let mut videos_over = total_videos.saturating_sub(max_videos);

    if items_over == 0 && videos_over == 0 {
        return;
    }

    // Oldest-first: media_positions is already in ascending turn/part order.
    for (turn_idx, part_idx, is_video) in media_positions {
        if items_over == 0 && videos_over == 0 {
            break;
        }
        let should_drop = items_over > 0 || (is_video && videos_over > 0);
        if !should_drop {
            continue;
        }
        let part = &mut history[turn_idx].parts[part_idx];
        let (mime, caption) = match part {
            Part::InlineMedia { mime, caption, .. } | Part::FileRef { mime, caption, .. } => {
                (mime.clone(), caption.clone())
            }
            _ => continue,
        };
        *part = Part::Text {
            text: placeholder_for(&mime, caption.as_deref()),
        };
        if items_over > 0 {
            items_over -= 1;
        }
        if is_video && videos_over > 0 {
            videos_over -= 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::Role;

    fn media_turn(mime: &str) -> Turn {
        Turn {
            role: Role::User,
            parts: vec![Part::FileRef {
                mime: mime.to_string(),
                uri: "ref://x".to_string(),
                caption: None,
            }],
        }
    }

    #[test]
    fn drops_oldest_items_first_when_over_total_cap() {
        let mut history: Vec<Turn> = (0..5).map(|_| media_turn("image/png")).collect();
        history.push(Turn::user("current turn"));

        cap_inline_media(&mut history, 2, 10);

        let remaining_media = history[..history.len() - 1]
            .iter()
            .filter(|t| t.parts.iter().any(|p| p.is_media()))
            .count();
        assert_eq!(remaining_media, 2);
        // Oldest two should have been replaced with placeholders.
        assert!(matches!(history[0].parts[0], Part::Text { .. }));
        assert!(matches!(history[1].parts[0], Part::Text { .. }));
    }

    #[test]
    fn never_drops_media_from_current_turn() {
        let mut history = vec![media_turn("image/png")];
        let mut current = media_turn("image/png");
        current.role = Role::User;
        history.push(current);

        cap_inline_media(&mut history, 0, 0);

        assert!(matches!(history[0].parts[0], Part::Text { .. }));
        assert!(history.last().unwrap().parts[0].is_media());
    }

    #[test]
    fn video_cap_drops_videos_even_under_item_cap() {
        let mut history = vec![media_turn("video/mp4"), media_turn("video/mp4")];
        history.push(Turn::user("current"));

        cap_inline_media(&mut history, 28, 1);

        let video_count = history[..history.len() - 1]
            .iter()
            .filter(|t| t.parts.iter().any(|p| p.is_video()))
            .count();
        assert_eq!(video_count, 1);
    }
}
