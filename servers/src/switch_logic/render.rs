//! HTML fragments for the live view.

use lib_switch::Snapshot;
use lib_switch::configs::NotificationChannel;
use lib_switch::utils::format_utc;

/// Channel properties that are never shown in clear.
pub const MASKED_PROPERTIES: [&str; 4] = ["bot_token", "smtp_pass", "smtp_user", "smtp_from"];

pub fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
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

/// The Device / Last Seen / Missing table pushed over SSE.
pub fn device_table(snapshot: &Snapshot) -> String {
    let mut html = String::from(
        "<table><thead><tr><th>Device</th><th>Last Seen</th><th>Missing</th></tr></thead><tbody>",
    );
    for client in &snapshot.clients {
        let seen = format_utc(client.last_seen);
        html.push_str("<tr>");
        html.push_str(&format!("<td>{}</td>", escape_html(&client.name)));
        html.push_str(&format!("<td data-utc='{seen}'>{seen}</td>"));
        if client.missing {
            html.push_str("<td style='color:red'>Yes</td>");
        } else {
            html.push_str("<td style='color:green'>No</td>");
        }
        html.push_str("</tr>");
    }
    html.push_str("</tbody></table>");
    html
}

/// A `<ul>` of configured channels, sorted by type, secrets masked.
pub fn configured_notifications(channels: &[NotificationChannel]) -> String {
    let mut sorted: Vec<&NotificationChannel> = channels.iter().collect();
    sorted.sort_by(|a, b| a.kind.cmp(&b.kind));

    let mut html = String::from("<ul>");
    for channel in sorted {
        html.push_str(&format!("<li><b>{}</b>", escape_html(&channel.kind)));
        let props = channel.string_properties();
        if !props.is_empty() {
            html.push_str(": <code>");
            for (key, value) in &props {
                let shown = if MASKED_PROPERTIES.contains(&key.as_str()) {
                    "***".to_string()
                } else {
                    escape_html(value)
                };
                html.push_str(&format!("{}={}; ", escape_html(key), shown));
            }
            html.push_str("</code>");
        }
        html.push_str("</li>");
    }
    html.push_str("</ul>");
    html
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use lib_switch::ClientRecord;
    use lib_switch::configs::ChannelProperties;

    #[test]
    fn table_rows_follow_snapshot_order() {
        let t = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let snap = Snapshot::from_records(vec![
            ClientRecord::new("beta", t, true),
            ClientRecord::new("<alpha>", t, false),
        ]);
        let html = device_table(&snap);
        assert!(html.starts_with("<table><thead><tr><th>Device</th>"));
        assert!(html.contains("<td data-utc='2024-05-01T12:00:00Z'>2024-05-01T12:00:00Z</td>"));
        let alpha = html.find("&lt;alpha&gt;").unwrap();
        let beta = html.find("beta").unwrap();
        assert!(alpha < beta);
        assert!(html.contains("<td style='color:red'>Yes</td>"));
        assert!(html.contains("<td style='color:green'>No</td>"));
    }

    #[test]
    fn empty_table_still_renders() {
        assert_eq!(
            device_table(&Snapshot::empty()),
            "<table><thead><tr><th>Device</th><th>Last Seen</th><th>Missing</th></tr></thead><tbody></tbody></table>"
        );
    }

    #[test]
    fn secrets_are_masked_and_channels_sorted() {
        let props = |pairs: &[(&str, &str)]| -> ChannelProperties {
            pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
        };
        let channels = vec![
            NotificationChannel::new("telegram", props(&[("chat_id", "42"), ("bot_token", "secret")])),
            NotificationChannel::new("dummy", props(&[])),
            NotificationChannel::new("smtp", props(&[("to", "ops@example.com"), ("smtp_pass", "pw")])),
        ];
        let html = configured_notifications(&channels);
        assert_eq!(
            html,
            "<ul><li><b>dummy</b></li>\
             <li><b>smtp</b>: <code>smtp_pass=***; to=ops@example.com; </code></li>\
             <li><b>telegram</b>: <code>bot_token=***; chat_id=42; </code></li></ul>"
        );
    }
}
