//! Bilingual email rendering for contact submissions.
//!
//! Templates live in `templates/` and are compiled by Askama. The `.html`
//! templates escape every interpolated value; the `.txt` templates are plain
//! text and are not escaped.
//!
//! ```rust,ignore
//! use contact_relay::template::render_notification;
//!
//! let rendered = render_notification(&submission)?;
//! let message = EmailMessage::new()
//!     .subject(rendered.subject)
//!     .html(rendered.html)
//!     .text(rendered.text);
//! ```

use askama::Template;
use chrono::{DateTime, Utc};

use crate::contact::{ContactSubmission, Locale};
use crate::error::DeliveryError;

/// Subject and bodies produced by a template.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedEmail {
    pub subject: String,
    pub html: String,
    pub text: String,
}

/// Render the operator notification for a submission.
pub fn render_notification(submission: &ContactSubmission) -> Result<RenderedEmail, DeliveryError> {
    let labels = NotificationLabels::for_locale(submission.language);
    let lang = submission.language.as_str();
    let timestamp = format_timestamp(submission.metadata.timestamp, submission.language);

    let subject = format!("{}: {}", labels.heading, submission.subject);
    let html = NotificationHtml {
        lang,
        labels,
        submission,
        timestamp: &timestamp,
    }
    .render()?;
    let text = NotificationText {
        labels,
        submission,
        timestamp: &timestamp,
    }
    .render()?;

    Ok(RenderedEmail {
        subject,
        html,
        text,
    })
}

/// Render the confirmation copy sent back to the submitter.
pub fn render_confirmation(submission: &ContactSubmission) -> Result<RenderedEmail, DeliveryError> {
    let labels = ConfirmationLabels::for_locale(submission.language);

    let html = ConfirmationHtml {
        lang: submission.language.as_str(),
        labels,
        submission,
    }
    .render()?;
    let text = ConfirmationText { labels, submission }.render()?;

    Ok(RenderedEmail {
        subject: labels.subject_line.to_string(),
        html,
        text,
    })
}

/// Format a capture time the way each locale writes dates. Times are UTC.
pub fn format_timestamp(timestamp: DateTime<Utc>, locale: Locale) -> String {
    match locale {
        Locale::De => timestamp.format("%-d.%-m.%Y, %H:%M:%S").to_string(),
        Locale::En => timestamp.format("%-m/%-d/%Y, %-I:%M:%S %p").to_string(),
    }
}

// ============================================================================
// Labels
// ============================================================================

struct NotificationLabels {
    heading: &'static str,
    heading_upper: &'static str,
    name: &'static str,
    email: &'static str,
    phone: &'static str,
    subject: &'static str,
    message: &'static str,
    additional: &'static str,
    timestamp: &'static str,
    ip_address: &'static str,
    country: &'static str,
    browser: &'static str,
    referrer: &'static str,
    footer: &'static str,
}

static NOTIFICATION_DE: NotificationLabels = NotificationLabels {
    heading: "Neue Kontaktanfrage",
    heading_upper: "NEUE KONTAKTANFRAGE",
    name: "Name",
    email: "E-Mail",
    phone: "Telefon",
    subject: "Betreff",
    message: "Nachricht",
    additional: "Zusätzliche Informationen",
    timestamp: "Zeitstempel",
    ip_address: "IP-Adresse",
    country: "Land",
    browser: "Browser",
    referrer: "Referrer",
    footer: "Diese E-Mail wurde automatisch vom Kontaktformular auf phialo.de generiert.",
};

static NOTIFICATION_EN: NotificationLabels = NotificationLabels {
    heading: "New Contact Request",
    heading_upper: "NEW CONTACT REQUEST",
    name: "Name",
    email: "Email",
    phone: "Phone",
    subject: "Subject",
    message: "Message",
    additional: "Additional Information",
    timestamp: "Timestamp",
    ip_address: "IP Address",
    country: "Country",
    browser: "Browser",
    referrer: "Referrer",
    footer: "This email was automatically generated from the contact form on phialo.de.",
};

impl NotificationLabels {
    fn for_locale(locale: Locale) -> &'static Self {
        match locale {
            Locale::De => &NOTIFICATION_DE,
            Locale::En => &NOTIFICATION_EN,
        }
    }
}

struct ConfirmationLabels {
    subject_line: &'static str,
    greeting: &'static str,
    thanks: &'static str,
    copy_intro: &'static str,
    subject: &'static str,
    message: &'static str,
    further_questions: &'static str,
    regards: &'static str,
    footer: &'static str,
}

static CONFIRMATION_DE: ConfirmationLabels = ConfirmationLabels {
    subject_line: "Ihre Nachricht wurde empfangen - Phialo Design",
    greeting: "Liebe/r",
    thanks: "vielen Dank für Ihre Nachricht. Wir haben Ihre Anfrage erhalten und werden uns so schnell wie möglich bei Ihnen melden.",
    copy_intro: "Hier ist eine Kopie Ihrer Nachricht:",
    subject: "Betreff",
    message: "Nachricht",
    further_questions: "Falls Sie weitere Fragen haben, können Sie uns gerne erneut kontaktieren.",
    regards: "Mit freundlichen Grüßen,",
    footer: "Diese E-Mail wurde automatisch generiert. Bitte antworten Sie nicht direkt auf diese E-Mail.",
};

static CONFIRMATION_EN: ConfirmationLabels = ConfirmationLabels {
    subject_line: "Your message has been received - Phialo Design",
    greeting: "Dear",
    thanks: "thank you for your message. We have received your inquiry and will get back to you as soon as possible.",
    copy_intro: "Here is a copy of your message:",
    subject: "Subject",
    message: "Message",
    further_questions: "If you have any further questions, please feel free to contact us again.",
    regards: "Best regards,",
    footer: "This email was automatically generated. Please do not reply directly to this email.",
};

impl ConfirmationLabels {
    fn for_locale(locale: Locale) -> &'static Self {
        match locale {
            Locale::De => &CONFIRMATION_DE,
            Locale::En => &CONFIRMATION_EN,
        }
    }
}

// ============================================================================
// Askama templates
// ============================================================================

#[derive(Template)]
#[template(path = "contact_notification.html")]
struct NotificationHtml<'a> {
    lang: &'a str,
    labels: &'a NotificationLabels,
    submission: &'a ContactSubmission,
    timestamp: &'a str,
}

#[derive(Template)]
#[template(path = "contact_notification.txt")]
struct NotificationText<'a> {
    labels: &'a NotificationLabels,
    submission: &'a ContactSubmission,
    timestamp: &'a str,
}

#[derive(Template)]
#[template(path = "contact_confirmation.html")]
struct ConfirmationHtml<'a> {
    lang: &'a str,
    labels: &'a ConfirmationLabels,
    submission: &'a ContactSubmission,
}

#[derive(Template)]
#[template(path = "contact_confirmation.txt")]
struct ConfirmationText<'a> {
    labels: &'a ConfirmationLabels,
    submission: &'a ContactSubmission,
}
