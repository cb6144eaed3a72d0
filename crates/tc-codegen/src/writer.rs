
use tc_tensor::DType;

/// Indentation-aware line buffer for emitted source.
#[derive(Debug, Default)]
pub struct CodeWriter {
    buf: String,
    indent: usize,
}

impl CodeWriter {
    pub fn new() -> Self {
        CodeWriter::default()
    }

    pub fn line(&mut self, line: impl AsRef<str>) {
        let line = line.as_ref();
        if line.is_empty() {
            self.buf.push('\n');
            return;
        }
        for _ in 0..self.indent {
            self.buf.push_str("    ");
        }
        self.buf.push_str(line);
        self.buf.push('\n');
    }

    pub fn blank(&mut self) {
        self.buf.push('\n');
    }

    /// Emit `header {` and indent until the matching [`CodeWriter::close`].
    pub fn open(&mut self, header: impl AsRef<str>) {
        let header = header.as_ref();
        if header.is_empty() {
            self.line("{");
        } else {
            self.line(format!("{} {{", header));
        }
        self.indent += 1;
    }

    pub fn close(&mut self) {
        self.indent = self.indent.saturating_sub(1);
        self.line("}");
    }

    /// Nested `for` loops over `dims`, with index variables `{prefix}0..`.
    /// `body` runs inside the innermost loop with the index names.
    pub fn for_each_index<F>(&mut self, dims: &[usize], prefix: &str, body: F)
    where
        F: FnOnce(&mut CodeWriter, &[String]),
    {
        let indices: Vec<String> = (0..dims.len()).map(|i| format!("{prefix}{i}")).collect();
        for (idx, dim) in indices.iter().zip(dims) {
            self.open(format!("for (size_t {idx} = 0; {idx} < {dim}; ++{idx})"));
        }
        body(self, &indices);
        for _ in dims {
            self.close();
        }
    }

    pub fn append(&mut self, other: &CodeWriter) {
        self.buf.push_str(&other.buf);
    }

    pub fn as_str(&self) -> &str {
        &self.buf
    }

    pub fn finish(self) -> String {
        self.buf
    }
}

/// Row-major linear offset of `indices` within `dims`.
pub fn linear_index_expr(dims: &[usize], indices: &[String]) -> String {
    let Some(first) = indices.first() else {
        return "0".to_string();
    };
    let mut expr = first.clone();
    for (dim, idx) in dims.iter().zip(indices).skip(1) {
        expr = format!("({expr}) * {dim} + {idx}");
    }
    expr
}

/// Spell `value` as a C literal of `dtype`.
pub fn c_literal(dtype: DType, value: f64) -> String {
    match dtype {
        DType::F32 | DType::F16 => float_literal(value, "f"),
        DType::F64 => float_literal(value, ""),
        DType::Boolean => if value != 0.0 { "1" } else { "0" }.to_string(),
        DType::I8 | DType::I32 => format!("{}", value as i64),
        DType::I64 => format!("INT64_C({})", value as i64),
        DType::U8 => format!("{}", value as u8),
    }
}

fn float_literal(value: f64, suffix: &str) -> String {
    if value.is_nan() {
        return "NAN".to_string();
    }
    if value.is_infinite() {
        let inf = if value.is_sign_negative() {
            "-INFINITY"
        } else {
            "INFINITY"
        };
        return inf.to_string();
    }
    // `{:?}` keeps a decimal point and round-trips the value.
    let mut out = format!("{value:?}");
    if !out.contains(['.', 'e', 'E']) {
        out.push_str(".0");
    }
    out.push_str(suffix);
    out
}

/// Make `name` usable as a C identifier.
pub fn sanitize_identifier(name: &str) -> String {
    let mut out: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if out.is_empty() || out.starts_with(|c: char| c.is_ascii_digit()) {
        out.insert(0, '_');
    }
    out
}
