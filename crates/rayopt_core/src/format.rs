//! Fixed-width text tables for per-surface coefficients.

use nalgebra::DMatrix;

const COLUMN_WIDTH: usize = 10;
const SIGNIFICANT: usize = 4;

/// `%g`-style rendering with `precision` significant digits: fixed notation
/// for exponents in `-4..precision`, scientific otherwise, trailing zeros
/// removed.
pub fn format_g(value: f64, precision: usize) -> String {
    if value.is_nan() {
        return "nan".to_string();
    }
    if value.is_infinite() {
        return if value > 0.0 { "inf" } else { "-inf" }.to_string();
    }
    if value == 0.0 {
        return if value.is_sign_negative() { "-0" } else { "0" }.to_string();
    }
    let p = precision.max(1);
    let sci = format!("{:.*e}", p - 1, value);
    let Some((mantissa, exp)) = sci.split_once('e') else {
        return sci;
    };
    let exp: i32 = exp.parse().unwrap_or(0);
    if exp < -4 || exp >= p as i32 {
        let sign = if exp < 0 { '-' } else { '+' };
        format!("{}e{}{:02}", trim_zeros(mantissa), sign, exp.abs())
    } else {
        let decimals = (p as i32 - 1 - exp).max(0) as usize;
        trim_zeros(&format!("{:.*}", decimals, value)).to_string()
    }
}

fn trim_zeros(s: &str) -> &str {
    if s.contains('.') {
        s.trim_end_matches('0').trim_end_matches('.')
    } else {
        s
    }
}

fn cell(value: f64) -> String {
    let text = format_g(value, SIGNIFICANT);
    let text = if text.starts_with('-') {
        text
    } else {
        format!(" {text}")
    };
    format!("{:>width$}", text, width = COLUMN_WIDTH)
}

fn prefix(index: &str, kind: &str) -> String {
    format!("{:>2} {:>1}", index, kind)
}

/// Renders one row per coefficient row: a header `# T <labels>`, rows
/// `<index> <type> <values>` at four significant digits, and optionally a
/// trailing `∑` row of column sums.
pub fn format_coefficients(
    coeff: &DMatrix<f64>,
    types: &[&str],
    labels: &[&str],
    sum: bool,
) -> Vec<String> {
    let mut lines = Vec::with_capacity(coeff.nrows() + 2);
    let mut header = prefix("#", "T");
    for label in labels {
        header.push_str(&format!("{:>width$}", label, width = COLUMN_WIDTH));
    }
    lines.push(header);

    for (i, row) in coeff.row_iter().enumerate() {
        let mut line = prefix(&i.to_string(), types.get(i).copied().unwrap_or(""));
        for value in row.iter() {
            line.push_str(&cell(*value));
        }
        lines.push(line);
    }

    if sum {
        let mut line = prefix(" ∑", "");
        for column in coeff.column_iter() {
            line.push_str(&cell(column.sum()));
        }
        lines.push(line);
    }
    lines
}
