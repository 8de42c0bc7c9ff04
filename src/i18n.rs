//! Display languages — string tables and detection.
//!
//! Three languages, mirroring the audience of the original frontend. The
//! selected language is the only state that survives between runs (see
//! `config::Settings`).

use crate::pipeline::types::RunSummary;

/// Supported display languages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lang {
    Ru,
    Uk,
    En,
}

impl Lang {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ru => "ru",
            Self::Uk => "uk",
            Self::En => "en",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "ru" => Some(Self::Ru),
            "uk" => Some(Self::Uk),
            "en" => Some(Self::En),
            _ => None,
        }
    }

    /// Map a BCP-47-like tag prefix to a language: `ru*` → ru,
    /// `uk*`/`ua*` → uk, anything else → en.
    pub fn from_tag(tag: &str) -> Self {
        let tag = tag.to_lowercase();
        if tag.starts_with("ru") {
            Self::Ru
        } else if tag.starts_with("uk") || tag.starts_with("ua") {
            Self::Uk
        } else {
            Self::En
        }
    }

    pub fn messages(&self) -> &'static Messages {
        match self {
            Self::Ru => &RU,
            Self::Uk => &UK,
            Self::En => &EN,
        }
    }
}

/// Decide the display language: a saved setting wins, then the locale tag,
/// then English.
pub fn detect_lang(saved: Option<&str>, tag: Option<&str>) -> Lang {
    if let Some(lang) = saved.and_then(Lang::from_str) {
        return lang;
    }
    tag.map(Lang::from_tag).unwrap_or(Lang::En)
}

/// The run vocabulary for one language.
pub struct Messages {
    pub checking: &'static str,
    pub stopping: &'static str,
    pub stopped: &'static str,
    pub summary_prefix: &'static str,
    pub valid_word: &'static str,
    pub blocked_word: &'static str,
    pub duplicates_word: &'static str,
    pub lines_label: &'static str,
    pub found_ids_label: &'static str,
    pub waking: &'static str,
    pub network_error: &'static str,
    pub proxy_missing: &'static str,
}

impl Messages {
    /// End-of-run summary line. A stopped run shows plain counts; a
    /// completed one adds percentages and the duplicate count.
    pub fn format_summary(&self, summary: &RunSummary) -> String {
        if summary.stopped {
            return format!(
                "{}: {}: {}, {}: {}",
                self.stopped,
                self.valid_word,
                summary.valid_count,
                self.blocked_word,
                summary.invalid_count
            );
        }

        let mut line = format!(
            "{} {}: {} ({}%), {}: {} ({}%)",
            self.summary_prefix,
            self.valid_word,
            summary.valid_count,
            summary.valid_pct,
            self.blocked_word,
            summary.invalid_count,
            summary.invalid_pct
        );
        if summary.duplicate_count > 0 {
            line.push_str(&format!(
                ", {}: {}",
                self.duplicates_word, summary.duplicate_count
            ));
        }
        line
    }

    /// Input counters line ("Lines: N, IDs found: M").
    pub fn format_input_stats(&self, lines: usize, ids: usize) -> String {
        format!(
            "{}: {lines}, {}: {ids}",
            self.lines_label, self.found_ids_label
        )
    }
}

static RU: Messages = Messages {
    checking: "Проверка…",
    stopping: "Останавливаем…",
    stopped: "Остановлено",
    summary_prefix: "Итог —",
    valid_word: "валидных",
    blocked_word: "заблокировано",
    duplicates_word: "дубли строк",
    lines_label: "Строк",
    found_ids_label: "найдено ID",
    waking: "Пробуждение сервера…",
    network_error: "Сетевой сбой. Попробуйте ещё раз",
    proxy_missing: "Не задан адрес backend-прокси (флаг --proxy или переменная FBCHECK_PROXY).",
};

static UK: Messages = Messages {
    checking: "Перевірка…",
    stopping: "Зупиняємо…",
    stopped: "Зупинено",
    summary_prefix: "Підсумок —",
    valid_word: "валідних",
    blocked_word: "заблоковано",
    duplicates_word: "дублі рядків",
    lines_label: "Рядків",
    found_ids_label: "знайдено ID",
    waking: "Пробудження сервера…",
    network_error: "Помилка мережі. Спробуйте ще раз",
    proxy_missing: "Не вказано адресу backend-проксі (прапорець --proxy або змінна FBCHECK_PROXY).",
};

static EN: Messages = Messages {
    checking: "Checking…",
    stopping: "Stopping…",
    stopped: "Stopped",
    summary_prefix: "Summary —",
    valid_word: "valid",
    blocked_word: "blocked",
    duplicates_word: "duplicate lines",
    lines_label: "Lines",
    found_ids_label: "IDs found",
    waking: "Warming up server…",
    network_error: "Network error. Please retry",
    proxy_missing: "No proxy base URL configured (use --proxy or the FBCHECK_PROXY variable).",
};
