// Typed parameter values

/// Type tag a parameter is declared with in the parameter store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    Int32,
    Int64,
    Float,
    FloatArray,
    Str,
    Binary,
    Bool,
}

/// A parameter value crossing the pub/sub boundary. Serialization matches
/// on every variant, so adding one here fails loudly everywhere it matters.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int32(i32),
    Int64(i64),
    Float(f32),
    FloatArray(Vec<f32>),
    Str(String),
    Binary(Vec<u8>),
    Bool(bool),
}

impl Value {
    pub fn kind(&self) -> ParamKind {
        match self {
            Value::Int32(_) => ParamKind::Int32,
            Value::Int64(_) => ParamKind::Int64,
            Value::Float(_) => ParamKind::Float,
            Value::FloatArray(_) => ParamKind::FloatArray,
            Value::Str(_) => ParamKind::Str,
            Value::Binary(_) => ParamKind::Binary,
            Value::Bool(_) => ParamKind::Bool,
        }
    }

    /// Check a wire value from a publish request against the parameter's
    /// declared type. None means mismatch, or a type clients cannot write.
    pub fn from_wire(value: &serde_json::Value, kind: ParamKind) -> Option<Value> {
        match kind {
            ParamKind::Int32 => i32::try_from(value.as_i64()?).ok().map(Value::Int32),
            ParamKind::Int64 => value.as_i64().map(Value::Int64),
            ParamKind::Float => value.as_f64().map(|f| Value::Float(f as f32)),
            // Accept 0/1 as well as true/false, as clients send both.
            ParamKind::Bool => match value {
                serde_json::Value::Bool(b) => Some(Value::Bool(*b)),
                serde_json::Value::Number(n) => n.as_i64().map(|i| Value::Bool(i != 0)),
                _ => None,
            },
            ParamKind::Str => value.as_str().map(|s| Value::Str(s.to_string())),
            ParamKind::FloatArray | ParamKind::Binary => None,
        }
    }
}
