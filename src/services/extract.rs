//! Pattern-based structured-field extraction from raw recognized text.
//!
//! Each field recognizer scans the same text independently and returns at
//! most one value (first syntactically valid match wins). Numeric runs are
//! claimed in precedence order INN > account > phone: a run consumed by a
//! higher-precedence recognizer is never offered to the ones below it.

use lazy_static::lazy_static;
use regex::Regex;

use crate::constants::ACCOUNT_DIGITS;
use crate::models::ExtractedFields;

lazy_static! {
    static ref RE_INN: Regex = Regex::new(r"\b\d{10}\b|\b\d{12}\b").unwrap();
    static ref RE_ACCOUNT: Regex = Regex::new(r"\b\d{20}\b").unwrap();
    static ref RE_PHONE: Regex =
        Regex::new(r"(?:\+7|8|7)?[\s\-]?\(?\d{3}\)?[\s\-]?\d{3}[\s\-]?\d{2}[\s\-]?\d{2}").unwrap();
    static ref RE_EMAIL: Regex =
        Regex::new(r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b").unwrap();
    static ref RE_DATE_DMY: Regex =
        Regex::new(r"\b(\d{1,2})[.\-/](\d{1,2})[.\-/](\d{4})\b").unwrap();
    static ref RE_DATE_YMD: Regex =
        Regex::new(r"\b(\d{4})[.\-/](\d{1,2})[.\-/](\d{1,2})\b").unwrap();
    static ref RE_SUM_CURRENCY: Regex = Regex::new(
        r"(?i)\b(\d{1,3}(?:[\s\u{00A0}]\d{3})+(?:[.,]\d{1,2})?|\d+(?:[.,]\d{1,2})?)\s*(?:руб|рублей|р\.|₽)"
    )
    .unwrap();
    static ref RE_SUM_PLAIN: Regex =
        Regex::new(r"\b\d{1,3}(?:[\s\u{00A0}]\d{3})+(?:[.,]\d{1,2})?\b|\b\d+[.,]\d{1,2}\b")
            .unwrap();
    static ref RE_FIO: Regex =
        Regex::new(r"\b([А-ЯЁ][а-яё]+)\s+([А-ЯЁ][а-яё]+)(?:\s+([А-ЯЁ][а-яё]+))?\b").unwrap();
    // OCR нередко читает № как латинскую N
    static ref RE_CONTRACT: Regex = Regex::new(r"(?:№|\bN)\s*(\d+(?:[\-/]\d+)*)").unwrap();
}

// Весовые векторы контрольной суммы ИНН (mod 11)
const INN10_WEIGHTS: [u32; 9] = [2, 4, 10, 3, 5, 9, 4, 6, 8];
const INN12_WEIGHTS_N11: [u32; 10] = [7, 2, 4, 10, 3, 5, 9, 4, 6, 8];
const INN12_WEIGHTS_N12: [u32; 11] = [3, 7, 2, 4, 10, 3, 5, 9, 4, 6, 8];

type Span = (usize, usize);

fn spans_overlap(a: Span, b: Span) -> bool {
    a.0 < b.1 && b.0 < a.1
}

fn overlaps_any(span: Span, consumed: &[Span]) -> bool {
    consumed.iter().any(|&c| spans_overlap(span, c))
}

/// Validate a Russian taxpayer identifier via its weighted mod-11 checksum.
/// Accepts 10- and 12-digit forms; anything else is rejected outright.
pub fn validate_inn(candidate: &str) -> bool {
    let digits: Vec<u32> = candidate.chars().filter_map(|c| c.to_digit(10)).collect();
    if digits.len() != candidate.chars().count() {
        return false;
    }
    match digits.len() {
        10 => {
            let control = weighted_control(&digits[..9], &INN10_WEIGHTS);
            control == digits[9]
        }
        12 => {
            let n11 = weighted_control(&digits[..10], &INN12_WEIGHTS_N11);
            let n12 = weighted_control(&digits[..11], &INN12_WEIGHTS_N12);
            n11 == digits[10] && n12 == digits[11]
        }
        _ => false,
    }
}

fn weighted_control(digits: &[u32], weights: &[u32]) -> u32 {
    let sum: u32 = digits.iter().zip(weights).map(|(d, w)| d * w).sum();
    sum % 11 % 10
}

/// Stateless miner over raw recognized text; safe to share across engines.
#[derive(Debug, Clone, Default)]
pub struct FieldExtractor;

impl FieldExtractor {
    pub fn new() -> Self {
        Self
    }

    pub fn extract(&self, raw_text: &str) -> ExtractedFields {
        let mut fields = ExtractedFields::default();
        // Byte spans of digit runs already claimed by a higher-precedence
        // recognizer.
        let mut consumed: Vec<Span> = Vec::new();

        // INN first: checksum-validated, most specific. A candidate that
        // fails the checksum is skipped and the scan continues.
        for m in RE_INN.find_iter(raw_text) {
            if validate_inn(m.as_str()) {
                fields.inn = Some(m.as_str().to_string());
                consumed.push((m.start(), m.end()));
                break;
            }
        }

        for m in RE_ACCOUNT.find_iter(raw_text) {
            let span = (m.start(), m.end());
            if m.as_str().len() == ACCOUNT_DIGITS && !overlaps_any(span, &consumed) {
                fields.account = Some(m.as_str().to_string());
                consumed.push(span);
                break;
            }
        }

        for m in RE_PHONE.find_iter(raw_text) {
            let span = (m.start(), m.end());
            if overlaps_any(span, &consumed) {
                continue;
            }
            if let Some(phone) = normalize_phone(m.as_str()) {
                fields.phone = Some(phone);
                consumed.push(span);
                break;
            }
        }

        if let Some(m) = RE_EMAIL.find(raw_text) {
            fields.email = Some(m.as_str().to_lowercase());
        }

        let date_spans = self.extract_date(raw_text, &mut fields);
        self.extract_sum(raw_text, &consumed, &date_spans, &mut fields);

        if let Some(caps) = RE_FIO.captures(raw_text) {
            let parts: Vec<&str> = caps
                .iter()
                .skip(1)
                .flatten()
                .map(|m| m.as_str())
                .collect();
            fields.fio = Some(parts.join(" "));
        }

        if let Some(caps) = RE_CONTRACT.captures(raw_text) {
            fields.contract_number = Some(caps[1].to_string());
        }

        fields
    }

    /// First date by position wins, across both numeric shapes. Separators
    /// are normalized to YYYY-MM-DD; calendar correctness is deliberately
    /// not checked, since OCR noise makes calendar rejection unreliable.
    fn extract_date(&self, raw_text: &str, fields: &mut ExtractedFields) -> Vec<Span> {
        let mut spans: Vec<Span> = Vec::new();
        let mut best: Option<(usize, String)> = None;

        for caps in RE_DATE_DMY.captures_iter(raw_text) {
            let m = caps.get(0).unwrap();
            spans.push((m.start(), m.end()));
            if best.as_ref().is_none_or(|(pos, _)| m.start() < *pos) {
                let normalized = format_date(&caps[3], &caps[2], &caps[1]);
                best = Some((m.start(), normalized));
            }
        }
        for caps in RE_DATE_YMD.captures_iter(raw_text) {
            let m = caps.get(0).unwrap();
            spans.push((m.start(), m.end()));
            if best.as_ref().is_none_or(|(pos, _)| m.start() < *pos) {
                let normalized = format_date(&caps[1], &caps[2], &caps[3]);
                best = Some((m.start(), normalized));
            }
        }

        fields.date = best.map(|(_, date)| date);
        spans
    }

    /// Currency-marked amounts win; a bare number is accepted only when it
    /// carries a thousands separator or fractional part, and only outside
    /// already-claimed digit runs and date spans.
    fn extract_sum(
        &self,
        raw_text: &str,
        consumed: &[Span],
        date_spans: &[Span],
        fields: &mut ExtractedFields,
    ) {
        for caps in RE_SUM_CURRENCY.captures_iter(raw_text) {
            let m = caps.get(1).unwrap();
            if overlaps_any((m.start(), m.end()), consumed) {
                continue;
            }
            if let Some(value) = parse_amount(m.as_str()) {
                fields.sum = Some(value);
                return;
            }
        }

        for m in RE_SUM_PLAIN.find_iter(raw_text) {
            let span = (m.start(), m.end());
            if overlaps_any(span, consumed) || overlaps_any(span, date_spans) {
                continue;
            }
            if let Some(value) = parse_amount(m.as_str()) {
                fields.sum = Some(value);
                return;
            }
        }
    }
}

fn format_date(year: &str, month: &str, day: &str) -> String {
    format!(
        "{:04}-{:02}-{:02}",
        year.parse::<u32>().unwrap_or(0),
        month.parse::<u32>().unwrap_or(0),
        day.parse::<u32>().unwrap_or(0)
    )
}

fn parse_amount(text: &str) -> Option<f64> {
    let cleaned: String = text
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '\u{00A0}')
        .map(|c| if c == ',' { '.' } else { c })
        .collect();
    cleaned.parse::<f64>().ok()
}

/// Strip formatting characters and canonicalize to +7XXXXXXXXXX.
fn normalize_phone(text: &str) -> Option<String> {
    let digits: String = text.chars().filter(|c| c.is_ascii_digit()).collect();
    match digits.len() {
        10 => Some(format!("+7{}", digits)),
        11 if digits.starts_with('8') => Some(format!("+7{}", &digits[1..])),
        11 if digits.starts_with('7') => Some(format!("+{}", digits)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extract(text: &str) -> ExtractedFields {
        FieldExtractor::new().extract(text)
    }

    #[test]
    fn test_valid_inn_10_digits() {
        assert!(validate_inn("7707083893"));
    }

    #[test]
    fn test_valid_inn_12_digits() {
        assert!(validate_inn("500100732259"));
    }

    #[test]
    fn test_flipped_digit_fails_checksum() {
        // Flip each digit of a valid INN in turn; every variant must fail.
        let valid = "7707083893";
        for (i, c) in valid.char_indices() {
            let flipped_digit = ((c.to_digit(10).unwrap() + 1) % 10).to_string();
            let mut candidate = valid.to_string();
            candidate.replace_range(i..i + 1, &flipped_digit);
            assert!(!validate_inn(&candidate), "flip at {} passed: {}", i, candidate);
        }
    }

    #[test]
    fn test_inn_rejects_wrong_length() {
        assert!(!validate_inn("12345"));
        assert!(!validate_inn("77070838931"));
    }

    #[test]
    fn test_inn_extraction_skips_failed_candidates() {
        // First 10-digit run fails the checksum, the second passes.
        let text = "ИНН 1234567890 исправлено: 7707083893";
        let fields = extract(text);
        assert_eq!(fields.inn.as_deref(), Some("7707083893"));
    }

    #[test]
    fn test_inn_absent_when_no_candidate_passes() {
        let fields = extract("ИНН 1234567890");
        assert!(fields.inn.is_none());
    }

    #[test]
    fn test_inn_run_not_offered_to_phone() {
        // A valid 12-digit INN contains phone-shaped substrings; the claimed
        // span must not leak into the phone field.
        let fields = extract("ИНН 500100732259");
        assert_eq!(fields.inn.as_deref(), Some("500100732259"));
        assert!(fields.phone.is_none());
        assert!(fields.account.is_none());
    }

    #[test]
    fn test_account_and_inn_coexist() {
        let text = "ИНН 7707083893 р/с 40702810900000005555";
        let fields = extract(text);
        assert_eq!(fields.inn.as_deref(), Some("7707083893"));
        assert_eq!(fields.account.as_deref(), Some("40702810900000005555"));
    }

    #[test]
    fn test_phone_normalization() {
        let fields = extract("Тел. 8 (495) 123-45-67");
        assert_eq!(fields.phone.as_deref(), Some("+74951234567"));

        let fields = extract("Телефон: +7 912 345-67-89");
        assert_eq!(fields.phone.as_deref(), Some("+79123456789"));
    }

    #[test]
    fn test_email_lowercased() {
        let fields = extract("Почта: Ivanov.II@Example.RU, прочее");
        assert_eq!(fields.email.as_deref(), Some("ivanov.ii@example.ru"));
    }

    #[test]
    fn test_date_dmy_normalized() {
        let fields = extract("Дата: 15.03.2023");
        assert_eq!(fields.date.as_deref(), Some("2023-03-15"));
    }

    #[test]
    fn test_date_ymd_and_separator_variants() {
        let fields = extract("от 2023/3/5");
        assert_eq!(fields.date.as_deref(), Some("2023-03-05"));
    }

    #[test]
    fn test_impossible_date_is_still_returned() {
        // Syntactically valid but calendar-impossible; no rejection.
        let fields = extract("Дата выдачи 31.02.2023");
        assert_eq!(fields.date.as_deref(), Some("2023-02-31"));
    }

    #[test]
    fn test_sum_with_currency_marker() {
        let fields = extract("Итого к оплате: 1 500,50 руб.");
        assert_eq!(fields.sum, Some(1500.5));
    }

    #[test]
    fn test_sum_with_currency_marker_and_no_separator() {
        // Слитная запись без разрядных пробелов
        let fields = extract("Сумма: 12000 руб.");
        assert_eq!(fields.sum, Some(12000.0));

        let fields = extract("Оплачено 500,25 ₽");
        assert_eq!(fields.sum, Some(500.25));
    }

    #[test]
    fn test_sum_without_marker_needs_separator_or_fraction() {
        let fields = extract("Всего 12 000,00");
        assert_eq!(fields.sum, Some(12000.0));

        // A bare short integer is not claimed as a sum.
        let fields = extract("страница 12");
        assert!(fields.sum.is_none());
    }

    #[test]
    fn test_date_fragment_not_claimed_as_sum() {
        let fields = extract("Договор от 15.03.2023");
        assert_eq!(fields.date.as_deref(), Some("2023-03-15"));
        assert!(fields.sum.is_none());
    }

    #[test]
    fn test_fio_two_and_three_tokens() {
        let fields = extract("Получатель: Иванов Иван Иванович, далее текст");
        assert_eq!(fields.fio.as_deref(), Some("Иванов Иван Иванович"));

        let fields = extract("счёт оплатил Петров Пётр в кассе");
        assert_eq!(fields.fio.as_deref(), Some("Петров Пётр"));
    }

    #[test]
    fn test_contract_number() {
        let fields = extract("Договор № 123-45 от 01.02.2023");
        assert_eq!(fields.contract_number.as_deref(), Some("123-45"));
    }

    #[test]
    fn test_contract_number_latin_marker() {
        let fields = extract("Договор N 77/2 от 01.02.2023");
        assert_eq!(fields.contract_number.as_deref(), Some("77/2"));
    }

    #[test]
    fn test_absent_fields_stay_none() {
        let fields = extract("просто текст без полей");
        assert!(fields.is_empty());
    }
}
