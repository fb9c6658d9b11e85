//! Per-request language negotiation and the user-facing message table.
//!
//! Only status/error texts are localized; generated documents never depend on
//! the negotiated language. A [`Language`] is resolved once per request and
//! passed explicitly to every [`Message::text`] call.
use std::{fmt, str::FromStr};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Language {
    #[default]
    ZhCn,
    EnUs,
    Fa,
    Ru,
}

/// Returned when a language tag names no supported language
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unsupported language: {0}")]
pub struct UnsupportedLanguage(pub String);

impl Language {
    pub const ALL: [Language; 4] = [Language::ZhCn, Language::EnUs, Language::Fa, Language::Ru];

    /// Canonical BCP 47 tag
    pub fn code(&self) -> &'static str {
        match self {
            Language::ZhCn => "zh-CN",
            Language::EnUs => "en-US",
            Language::Fa => "fa",
            Language::Ru => "ru",
        }
    }

    /// Pick the request language.
    ///
    /// A supported `lang` query value wins. Otherwise the `Accept-Language`
    /// entries are tried in order (quality weights are ignored), and `fallback`
    /// is used when nothing matches.
    pub fn negotiate(
        query: Option<&str>,
        accept_language: Option<&str>,
        fallback: Language,
    ) -> Language {
        if let Some(lang) = query.and_then(|q| q.parse().ok()) {
            return lang;
        }

        accept_language
            .into_iter()
            .flat_map(|header| header.split(','))
            .find_map(|candidate| candidate.parse().ok())
            .unwrap_or(fallback)
    }
}

impl FromStr for Language {
    type Err = UnsupportedLanguage;

    /// Accepts full tags (`en-US`), primary subtags (`en`) and weighted header
    /// entries (`en;q=0.8`), case-insensitively.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let tag = s
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase()
            .replace('_', "-");
        let primary = tag.split('-').next().unwrap_or_default();

        match primary {
            "zh" => Ok(Language::ZhCn),
            "en" => Ok(Language::EnUs),
            "fa" => Ok(Language::Fa),
            "ru" => Ok(Language::Ru),
            _ => Err(UnsupportedLanguage(s.to_string())),
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Localized status messages
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Message {
    NotFound,
    InternalError,
    MissingConfig,
    MissingUrl,
    ShortUrlNotFound,
    InvalidShortUrl,
    /// Used as a prefix, the parser message follows it
    InvalidFormat,
}

impl Message {
    pub fn text(self, language: Language) -> &'static str {
        use Language::*;
        use Message::*;

        match (self, language) {
            (NotFound, ZhCn) => "未找到",
            (NotFound, EnUs) => "Not Found",
            (NotFound, Fa) => "یافت نشد",
            (NotFound, Ru) => "Не найдено",

            (InternalError, ZhCn) => "内部服务器错误",
            (InternalError, EnUs) => "Internal Server Error",
            (InternalError, Fa) => "خطای داخلی سرور",
            (InternalError, Ru) => "Внутренняя ошибка сервера",

            (MissingConfig, ZhCn) => "缺少配置参数",
            (MissingConfig, EnUs) => "Missing config parameter",
            (MissingConfig, Fa) => "پارامتر پیکربندی وجود ندارد",
            (MissingConfig, Ru) => "Отсутствует параметр config",

            (MissingUrl, ZhCn) => "缺少URL参数",
            (MissingUrl, EnUs) => "Missing URL parameter",
            (MissingUrl, Fa) => "پارامتر URL وجود ندارد",
            (MissingUrl, Ru) => "Отсутствует параметр URL",

            (ShortUrlNotFound, ZhCn) => "短链接未找到",
            (ShortUrlNotFound, EnUs) => "Short URL not found",
            (ShortUrlNotFound, Fa) => "لینک کوتاه یافت نشد",
            (ShortUrlNotFound, Ru) => "Короткая ссылка не найдена",

            (InvalidShortUrl, ZhCn) => "无效的短链接",
            (InvalidShortUrl, EnUs) => "Invalid short URL",
            (InvalidShortUrl, Fa) => "لینک کوتاه نامعتبر است",
            (InvalidShortUrl, Ru) => "Недействительная короткая ссылка",

            (InvalidFormat, ZhCn) => "格式无效：",
            (InvalidFormat, EnUs) => "Invalid format: ",
            (InvalidFormat, Fa) => "قالب نامعتبر: ",
            (InvalidFormat, Ru) => "Неверный формат: ",
        }
    }
}
