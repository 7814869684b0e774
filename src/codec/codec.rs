use std::any::{Any, TypeId};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

pub(crate) type ParseFn<T> = Arc<dyn Fn(&str) -> Option<T> + Send + Sync>;
pub(crate) type SerializeFn<T> = Arc<dyn Fn(&T) -> String + Send + Sync>;

/// The primitive shapes the built-in codec knows how to store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrimitiveKind {
    Bool,
    Number(NumberKind),
    String,
}

/// Numeric types the built-in codec handles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumberKind {
    F32,
    F64,
    I8,
    I16,
    I32,
    I64,
    I128,
    Isize,
    U8,
    U16,
    U32,
    U64,
    U128,
    Usize,
}

macro_rules! number_kinds {
    ($($ty:ty => $kind:ident),* $(,)?) => {
        impl NumberKind {
            fn of(id: TypeId) -> Option<Self> {
                $(if id == TypeId::of::<$ty>() {
                    return Some(NumberKind::$kind);
                })*
                None
            }

            fn parse(self, raw: &str) -> Option<Box<dyn Any>> {
                let raw = raw.trim();
                match self {
                    NumberKind::F32 => parse_number(raw).map(|v| Box::new(v as f32) as Box<dyn Any>),
                    NumberKind::F64 => parse_number(raw).map(|v| Box::new(v) as Box<dyn Any>),
                    $(NumberKind::$kind => raw
                        .parse::<$ty>()
                        .ok()
                        .or_else(|| {
                            let v = parse_number(raw)?;
                            let in_range = v >= <$ty>::MIN as f64 && v <= <$ty>::MAX as f64;
                            (v.is_finite() && v.fract() == 0.0 && in_range).then(|| v as $ty)
                        })
                        .map(|v| Box::new(v) as Box<dyn Any>),)*
                }
            }

            fn format(self, value: &dyn Any) -> Option<String> {
                match self {
                    NumberKind::F32 => value.downcast_ref::<f32>().map(|v| format_float(f64::from(*v))),
                    NumberKind::F64 => value.downcast_ref::<f64>().map(|v| format_float(*v)),
                    $(NumberKind::$kind => value.downcast_ref::<$ty>().map(ToString::to_string),)*
                }
            }
        }
    };
}

number_kinds! {
    i8 => I8,
    i16 => I16,
    i32 => I32,
    i64 => I64,
    i128 => I128,
    isize => Isize,
    u8 => U8,
    u16 => U16,
    u32 => U32,
    u64 => U64,
    u128 => U128,
    usize => Usize,
}

impl PrimitiveKind {
    /// The runtime type tag of `value`, if it is a supported primitive.
    pub fn of<T: Any>(value: &T) -> Option<Self> {
        let id = (value as &dyn Any).type_id();
        if id == TypeId::of::<f32>() {
            return Some(PrimitiveKind::Number(NumberKind::F32));
        }
        if id == TypeId::of::<f64>() {
            return Some(PrimitiveKind::Number(NumberKind::F64));
        }
        if id == TypeId::of::<bool>() {
            return Some(PrimitiveKind::Bool);
        }
        if id == TypeId::of::<String>() {
            return Some(PrimitiveKind::String);
        }
        NumberKind::of(id).map(PrimitiveKind::Number)
    }

    fn parse(self, raw: &str) -> Option<Box<dyn Any>> {
        match self {
            PrimitiveKind::Bool => match raw {
                "true" => Some(Box::new(true)),
                "false" => Some(Box::new(false)),
                _ => None,
            },
            PrimitiveKind::Number(kind) => kind.parse(raw),
            PrimitiveKind::String => Some(Box::new(raw.to_string())),
        }
    }

    fn format(self, value: &dyn Any) -> Option<String> {
        match self {
            PrimitiveKind::Bool => value.downcast_ref::<bool>().map(ToString::to_string),
            PrimitiveKind::Number(kind) => kind.format(value),
            PrimitiveKind::String => value.downcast_ref::<String>().cloned(),
        }
    }
}

/// Read a trimmed string the way a standard number conversion does.
///
/// An empty string is zero. Infinity is only spelled `Infinity`, with an
/// optional sign. `0x`, `0o` and `0b` prefixes are unsigned integers. Any
/// other letter besides an exponent marker makes the input unparseable, and
/// so does a NaN result.
fn parse_number(raw: &str) -> Option<f64> {
    match raw {
        "" => return Some(0.0),
        "Infinity" | "+Infinity" => return Some(f64::INFINITY),
        "-Infinity" => return Some(f64::NEG_INFINITY),
        _ => {}
    }
    for (prefix, radix) in [("0x", 16), ("0X", 16), ("0o", 8), ("0O", 8), ("0b", 2), ("0B", 2)] {
        if let Some(digits) = raw.strip_prefix(prefix) {
            return u128::from_str_radix(digits, radix)
                .ok()
                .filter(|_| !digits.starts_with('+'))
                .map(|v| v as f64);
        }
    }
    if !raw
        .chars()
        .all(|c| c.is_ascii_digit() || matches!(c, '+' | '-' | '.' | 'e' | 'E'))
    {
        return None;
    }
    raw.parse::<f64>().ok().filter(|v| !v.is_nan())
}

fn format_float(value: f64) -> String {
    if value == f64::INFINITY {
        "Infinity".to_string()
    } else if value == f64::NEG_INFINITY {
        "-Infinity".to_string()
    } else {
        value.to_string()
    }
}

/// How a state value is turned into the raw string kept in a store, and
/// back.
///
/// A codec is either supplied by the caller or derived from the default
/// value's type with [`Codec::for_value`]. Parsing never fails loudly: a
/// parse function that returns `None` or panics means "nothing usable is
/// stored".
pub struct Codec<T> {
    parse: ParseFn<T>,
    serialize: Option<SerializeFn<T>>,
    kind: Option<PrimitiveKind>,
}

impl<T: 'static> Codec<T> {
    /// A codec made of caller-supplied functions.
    pub fn custom<P, S>(parse: P, serialize: S) -> Self
    where
        P: Fn(&str) -> Option<T> + Send + Sync + 'static,
        S: Fn(&T) -> String + Send + Sync + 'static,
    {
        Self::from_parts(Arc::new(parse), Arc::new(serialize))
    }

    pub(crate) fn from_parts(parse: ParseFn<T>, serialize: SerializeFn<T>) -> Self {
        Self {
            parse,
            serialize: Some(serialize),
            kind: None,
        }
    }

    /// The built-in codec for the type of `value`.
    ///
    /// Booleans, numbers and strings get a real codec. Any other type gets
    /// a codec that never parses anything and never writes anything.
    pub fn for_value(value: &T) -> Self {
        match PrimitiveKind::of(value) {
            Some(kind) => Self {
                parse: Arc::new(move |raw: &str| {
                    kind.parse(raw)
                        .and_then(|boxed| boxed.downcast::<T>().ok())
                        .map(|boxed| *boxed)
                }),
                serialize: Some(Arc::new(move |value: &T| {
                    kind.format(value as &dyn Any).unwrap_or_default()
                })),
                kind: Some(kind),
            },
            None => Self {
                parse: Arc::new(|_: &str| None),
                serialize: None,
                kind: None,
            },
        }
    }

    /// The primitive shape this codec was derived for, if it is built in.
    pub fn primitive_kind(&self) -> Option<PrimitiveKind> {
        self.kind
    }

    /// Whether values can be written at all.
    pub fn can_serialize(&self) -> bool {
        self.serialize.is_some()
    }

    /// Parse `raw`, treating a panicking parse function as unparseable.
    pub fn parse(&self, raw: &str) -> Option<T> {
        match panic::catch_unwind(AssertUnwindSafe(|| (self.parse)(raw))) {
            Ok(value) => value,
            Err(_) => {
                tracing::warn!(raw, "parse function panicked; treating value as unparseable");
                None
            }
        }
    }

    /// Serialize `value`, or `None` when this codec cannot write.
    pub fn serialize(&self, value: &T) -> Option<String> {
        self.serialize.as_ref().map(|serialize| serialize(value))
    }
}

impl<T> Clone for Codec<T> {
    fn clone(&self) -> Self {
        Self {
            parse: Arc::clone(&self.parse),
            serialize: self.serialize.clone(),
            kind: self.kind,
        }
    }
}

impl<T> fmt::Debug for Codec<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Codec")
            .field("kind", &self.kind)
            .field("can_serialize", &self.serialize.is_some())
            .finish()
    }
}
