/// Inline keyboard (buttons) used for campus selection.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InlineKeyboard {
    pub rows: Vec<Vec<InlineButton>>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InlineButton {
    pub label: String,
    pub callback_data: String,
}

impl InlineKeyboard {
    pub fn new(rows: Vec<Vec<InlineButton>>) -> Self {
        Self { rows }
    }

    /// Lay out `(label, callback_data)` pairs `per_row` at a time.
    ///
    /// Labels longer than `max_label_len` characters are shortened with `...`.
    pub fn grid(items: &[(String, String)], per_row: usize, max_label_len: usize) -> Self {
        let per_row = per_row.max(1);
        let rows = items
            .chunks(per_row)
            .map(|chunk| {
                chunk
                    .iter()
                    .map(|(label, data)| InlineButton {
                        label: shorten_label(label, max_label_len),
                        callback_data: data.clone(),
                    })
                    .collect()
            })
            .collect();
        Self { rows }
    }

    pub fn button_count(&self) -> usize {
        self.rows.iter().map(Vec::len).sum()
    }
}

fn shorten_label(label: &str, max_len: usize) -> String {
    if label.chars().count() <= max_len {
        return label.to_string();
    }
    let keep = max_len.saturating_sub(3);
    format!("{}...", label.chars().take(keep).collect::<String>())
}

/// Limits of a messenger implementation.
#[derive(Clone, Copy, Debug)]
pub struct MessagingCapabilities {
    /// Longest message body the transport accepts, in characters.
    pub max_message_len: usize,
}
