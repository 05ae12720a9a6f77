//! Server-rendered HTML for the admin console.
//!
//! Deliberately plain: one list page with inline forms, one error page. Every value that came
//! from the operator or a collaborator goes through [`escape`].

use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::request::{GrantRequest, RequestStatus};

const STYLE: &str = "body{font-family:sans-serif;margin:2rem;max-width:72rem}\
table{border-collapse:collapse;width:100%}\
th,td{border-bottom:1px solid #ddd;padding:.4rem;text-align:left;vertical-align:top}\
form.inline{display:inline}\
.status{font-weight:bold}.risk{color:#a40}.error{color:#a00}\
fieldset{margin-bottom:2rem}label{display:block;margin:.3rem 0}";

/// Escape text for an HTML body or double-quoted attribute.
pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

fn page(title: &str, body: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html><head><meta charset=\"utf-8\"><title>{}</title>\
         <style>{STYLE}</style></head><body>{body}</body></html>\n",
        escape(title)
    )
}

fn timestamp(at: Option<DateTime<Utc>>) -> String {
    at.map(|at| at.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_default()
}

/// The admin list page: a create form followed by every request, newest first.
pub fn admin_page(requests: &[GrantRequest]) -> String {
    let mut body = String::from("<h1>Grant requests</h1>");
    body.push_str(&create_form());

    if requests.is_empty() {
        body.push_str("<p>No grant requests yet.</p>");
        return page("Grant console", &body);
    }

    body.push_str(
        "<table><thead><tr><th>ID</th><th>Request</th><th>Status</th><th>Created</th>\
         <th>Run</th><th>Delivered</th><th>Review</th><th>Actions</th></tr></thead><tbody>",
    );
    for request in requests {
        body.push_str(&request_row(request));
    }
    body.push_str("</tbody></table>");

    page("Grant console", &body)
}

fn create_form() -> String {
    let mut form = String::from(
        "<form method=\"post\" action=\"/admin/new\"><fieldset><legend>New request</legend>",
    );
    for (name, label) in [
        ("name", "Name"),
        ("organization", "Organization"),
        ("amount", "Amount"),
        ("recipient", "Recipient email"),
    ] {
        form.push_str(&format!("<label>{label} <input name=\"{name}\" type=\"text\"></label>"));
    }
    form.push_str(
        "<label>Narrative<br>\
         <textarea name=\"narrative\" rows=\"5\" cols=\"80\"></textarea></label>\
         <button type=\"submit\">Create</button></fieldset></form>",
    );
    form
}

fn request_row(request: &GrantRequest) -> String {
    let id = request.id.0;
    let mut row = format!(
        "<tr id=\"request-{id}\"><td title=\"{id}\">{}</td><td><strong>{}</strong>{}</td>\
         <td class=\"status\">{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>",
        request.id,
        escape(&request.title()),
        field_list(request),
        request.status,
        timestamp(Some(request.created_at)),
        timestamp(request.run_at),
        delivery_cell(request),
        review_cell(request),
    );

    if request.status == RequestStatus::Created {
        row.push_str(&action_button("run", id, "Run"));
    }
    if request.file_path.is_some() {
        row.push_str(&format!("<a href=\"/admin/download/{id}\">Download</a> "));
    }
    if request.status == RequestStatus::Generated {
        row.push_str(&format!(
            "<form class=\"inline\" method=\"post\" action=\"/admin/delivered/{id}\">\
             <input name=\"recipient\" type=\"email\" placeholder=\"{}\">\
             <button type=\"submit\">Deliver</button></form> ",
            escape(request.recipient.as_deref().unwrap_or("recipient"))
        ));
    }
    if request.status != RequestStatus::Archived {
        row.push_str(&action_button("archive", id, "Archive"));
    }
    row.push_str(&format!(
        "<form class=\"inline\" method=\"post\" action=\"/admin/delete/{id}\" \
         onsubmit=\"return confirm('Delete this request permanently?')\">\
         <button type=\"submit\">Delete</button></form>"
    ));

    row.push_str("</td></tr>");
    row
}

fn action_button(action: &str, id: uuid::Uuid, label: &str) -> String {
    format!(
        "<form class=\"inline\" method=\"post\" action=\"/admin/{action}/{id}\">\
         <button type=\"submit\">{label}</button></form> "
    )
}

fn field_list(request: &GrantRequest) -> String {
    let mut list = String::from("<br><small>");
    for (key, value) in &request.fields {
        let value: String = match value {
            Value::String(s) => s.chars().take(80).collect(),
            other => other.to_string(),
        };
        list.push_str(&format!("{}: {}<br>", escape(key), escape(&value)));
    }
    list.push_str("</small>");
    list
}

fn delivery_cell(request: &GrantRequest) -> String {
    match (&request.delivered_to, request.delivered_at) {
        (Some(to), at) => format!("{}<br>{}", escape(to), timestamp(at)),
        (None, at) => timestamp(at),
    }
}

fn review_cell(request: &GrantRequest) -> String {
    let Some(review) = request.review() else {
        return String::new();
    };
    if review.risks.is_empty() {
        return format!("{} words, no risks flagged", review.metrics.words);
    }
    let risks: Vec<String> = review
        .risks
        .iter()
        .map(|risk| format!("<span class=\"risk\">{}</span>", escape(risk)))
        .collect();
    format!("{} words<br>{}", review.metrics.words, risks.join("<br>"))
}

/// Page shown when an action fails.
pub fn error_page(status: StatusCode, message: &str) -> String {
    page(
        "Grant console error",
        &format!(
            "<h1>{} {}</h1><p class=\"error\">{}</p>\
             <p><a href=\"/admin\">Back to requests</a></p>",
            status.as_u16(),
            escape(status.canonical_reason().unwrap_or("Error")),
            escape(message)
        ),
    )
}
