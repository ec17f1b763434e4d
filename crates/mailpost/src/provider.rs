//! Well-known provider presets.
//!
//! A service identifier such as `"Gmail"`, `"google mail"`, `"gmail.com"` or
//! even `"user@gmail.com"` resolves to the provider's SMTP endpoint. Unknown
//! identifiers resolve to `None`.

use mailpost_smtp::AuthMechanism;

/// Connection defaults for one provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Provider {
    /// Canonical provider name.
    pub name: &'static str,
    /// Alternative names accepted by [`lookup`].
    pub aliases: &'static [&'static str],
    /// E-mail domains served by the provider.
    pub domains: &'static [&'static str],
    /// SMTP host.
    pub host: &'static str,
    /// SMTP port.
    pub port: u16,
    /// Implicit TLS on connect.
    pub secure: bool,
    /// Preferred authentication mechanism, if the provider needs one.
    pub auth_method: Option<AuthMechanism>,
}

const fn preset(
    name: &'static str,
    aliases: &'static [&'static str],
    domains: &'static [&'static str],
    host: &'static str,
    port: u16,
    secure: bool,
) -> Provider {
    Provider {
        name,
        aliases,
        domains,
        host,
        port,
        secure,
        auth_method: None,
    }
}

static PROVIDERS: &[Provider] = &[
    preset(
        "Gmail",
        &["Google Mail"],
        &["gmail.com", "googlemail.com"],
        "smtp.gmail.com",
        465,
        true,
    ),
    preset(
        "Outlook365",
        &["Office365", "Outlook", "Hotmail", "Live"],
        &["outlook.com", "hotmail.com", "live.com"],
        "smtp.office365.com",
        587,
        false,
    ),
    preset(
        "Yahoo",
        &["Yahoo Mail"],
        &["yahoo.com", "ymail.com"],
        "smtp.mail.yahoo.com",
        465,
        true,
    ),
    preset(
        "iCloud",
        &["Me", "Mac"],
        &["icloud.com", "me.com", "mac.com"],
        "smtp.mail.me.com",
        587,
        false,
    ),
    Provider {
        auth_method: Some(AuthMechanism::Login),
        ..preset("Zoho", &[], &["zoho.com"], "smtp.zoho.com", 465, true)
    },
    preset(
        "FastMail",
        &[],
        &["fastmail.fm", "fastmail.com"],
        "smtp.fastmail.com",
        465,
        true,
    ),
    preset(
        "GMX",
        &[],
        &["gmx.com", "gmx.net", "gmx.de"],
        "mail.gmx.com",
        587,
        false,
    ),
    preset(
        "Yandex",
        &[],
        &["yandex.ru", "yandex.com"],
        "smtp.yandex.ru",
        465,
        true,
    ),
    preset("QQ", &[], &["qq.com"], "smtp.qq.com", 465, true),
    preset("Mail.ru", &[], &["mail.ru"], "smtp.mail.ru", 465, true),
    preset(
        "SES",
        &["AWS SES", "Amazon SES"],
        &[],
        "email-smtp.us-east-1.amazonaws.com",
        465,
        true,
    ),
    preset("SendGrid", &[], &[], "smtp.sendgrid.net", 587, false),
    preset("Mailgun", &[], &[], "smtp.mailgun.org", 465, true),
    preset(
        "Postmark",
        &["PostmarkApp"],
        &[],
        "smtp.postmarkapp.com",
        2525,
        false,
    ),
    preset("Mandrill", &[], &[], "smtp.mandrillapp.com", 587, false),
];

/// Returns every known provider.
#[must_use]
pub fn providers() -> &'static [Provider] {
    PROVIDERS
}

/// Looks up a provider by name, alias, e-mail domain or e-mail address.
///
/// Matching ignores case, whitespace and punctuation other than `.` and `-`.
#[must_use]
pub fn lookup(service: &str) -> Option<&'static Provider> {
    let service = service.rsplit_once('@').map_or(service, |(_, domain)| domain);
    let key = normalize(service);
    if key.is_empty() {
        return None;
    }

    PROVIDERS.iter().find(|provider| {
        std::iter::once(provider.name)
            .chain(provider.aliases.iter().copied())
            .chain(provider.domains.iter().copied())
            .any(|candidate| normalize(candidate) == key)
    })
}

fn normalize(key: &str) -> String {
    key.chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '.' || *c == '-')
        .map(|c| c.to_ascii_lowercase())
        .collect()
}
