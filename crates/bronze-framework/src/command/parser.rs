//! Typed argument parsing.
//!
//! A command declares its parameters explicitly with [`Param`]; each token
//! is coerced by the converter registered for the parameter's type in a
//! [`ConverterRegistry`]. Parsed values are read back through [`Args`].
//!
//! ```rust,ignore
//! let params = [Param::new::<i64>("min"), Param::new::<i64>("max")];
//! let args = parse(&params, &tokens, &registry)?;
//! let (min, max) = (args.get::<i64>(0), args.get::<i64>(1));
//! ```

use std::any::{Any, TypeId, type_name};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::error::{BoxError, ParseError};

/// A converted value.
pub type ArgValue = Box<dyn Any + Send + Sync>;

type ConvertFn = Arc<dyn Fn(&str) -> Result<ArgValue, BoxError> + Send + Sync>;

// ============================================================================
// Built-in argument types
// ============================================================================

/// A user mention: `(met)<id>(met)` or a bare id.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Mention(pub String);

/// Error converting a token.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct ConvertError(pub String);

impl FromStr for Mention {
    type Err = ConvertError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let id = s
            .strip_prefix("(met)")
            .and_then(|rest| rest.strip_suffix("(met)"))
            .unwrap_or(s);
        if id.is_empty() || !id.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(ConvertError(format!("'{s}' is not a mention")));
        }
        Ok(Self(id.to_string()))
    }
}

fn parse_bool(s: &str) -> Result<bool, ConvertError> {
    match s.to_ascii_lowercase().as_str() {
        "true" | "yes" | "y" | "on" | "1" => Ok(true),
        "false" | "no" | "n" | "off" | "0" => Ok(false),
        _ => Err(ConvertError(format!("'{s}' is not a boolean"))),
    }
}

// ============================================================================
// Registry
// ============================================================================

/// Type → converter table.
#[derive(Clone)]
pub struct ConverterRegistry {
    converters: HashMap<TypeId, ConvertFn>,
}

impl fmt::Debug for ConverterRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConverterRegistry")
            .field("types", &self.converters.len())
            .finish()
    }
}

impl Default for ConverterRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register::<String, _, _>(|s| Ok::<_, ConvertError>(s.to_string()));
        registry.register_from_str::<i64>();
        registry.register_from_str::<i32>();
        registry.register_from_str::<u64>();
        registry.register_from_str::<f64>();
        registry.register_from_str::<f32>();
        registry.register_from_str::<Mention>();
        registry.register::<bool, _, _>(parse_bool);
        registry
    }
}

impl ConverterRegistry {
    /// A registry with no converters at all.
    pub fn empty() -> Self {
        Self {
            converters: HashMap::new(),
        }
    }

    /// Registers (or replaces) the converter for `T`.
    pub fn register<T, F, E>(&mut self, convert: F)
    where
        T: Any + Send + Sync,
        F: Fn(&str) -> Result<T, E> + Send + Sync + 'static,
        E: std::error::Error + Send + Sync + 'static,
    {
        let erased: ConvertFn = Arc::new(move |token| match convert(token) {
            Ok(value) => Ok(Box::new(value) as ArgValue),
            Err(e) => Err(Arc::new(e) as BoxError),
        });
        self.converters.insert(TypeId::of::<T>(), erased);
    }

    /// Registers `T::from_str` as the converter for `T`.
    pub fn register_from_str<T>(&mut self)
    where
        T: FromStr + Any + Send + Sync,
        T::Err: std::error::Error + Send + Sync + 'static,
    {
        self.register::<T, _, _>(T::from_str);
    }

    /// Returns `true` if `T` can be converted.
    pub fn supports<T: Any>(&self) -> bool {
        self.converters.contains_key(&TypeId::of::<T>())
    }

    fn get(&self, type_id: TypeId) -> Option<&ConvertFn> {
        self.converters.get(&type_id)
    }
}

// ============================================================================
// Params and Args
// ============================================================================

/// One declared parameter.
#[derive(Debug, Clone)]
pub struct Param {
    name: String,
    type_id: TypeId,
    type_name: &'static str,
    optional: bool,
}

impl Param {
    /// A required parameter of type `T`.
    pub fn new<T: Any>(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_id: TypeId::of::<T>(),
            type_name: type_name::<T>(),
            optional: false,
        }
    }

    /// An optional parameter of type `T`.
    pub fn optional<T: Any>(name: impl Into<String>) -> Self {
        Self {
            optional: true,
            ..Self::new::<T>(name)
        }
    }

    /// Parameter name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared type name.
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Whether the parameter may be omitted.
    pub fn is_optional(&self) -> bool {
        self.optional
    }
}

/// Parsed arguments, positionally matching the declared parameters.
#[derive(Default)]
pub struct Args {
    names: Vec<String>,
    values: Vec<Option<ArgValue>>,
}

impl fmt::Debug for Args {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Args")
            .field("names", &self.names)
            .field(
                "present",
                &self.values.iter().map(Option::is_some).collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl Args {
    /// Number of declared parameters.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns `true` if the command declares no parameters.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Returns argument `index` as `T`, if present and of that type.
    pub fn get<T: Any>(&self, index: usize) -> Option<&T> {
        self.values.get(index)?.as_ref()?.downcast_ref()
    }

    /// Returns the argument named `name` as `T`.
    pub fn value<T: Any>(&self, name: &str) -> Option<&T> {
        let index = self.names.iter().position(|n| n == name)?;
        self.get(index)
    }

    /// Clones argument `index` out.
    pub fn cloned<T: Any + Clone>(&self, index: usize) -> Option<T> {
        self.get::<T>(index).cloned()
    }
}

/// Walks `tokens` against `params` in order.
pub fn parse(
    params: &[Param],
    tokens: &[String],
    registry: &ConverterRegistry,
) -> Result<Args, ParseError> {
    if tokens.len() > params.len() {
        return Err(ParseError::TooManyArguments {
            expected: params.len(),
            got: tokens.len(),
        });
    }

    let mut values = Vec::with_capacity(params.len());
    for (index, param) in params.iter().enumerate() {
        let convert = registry
            .get(param.type_id)
            .ok_or_else(|| ParseError::NoParseFunction {
                index,
                param: param.name.clone(),
                type_name: param.type_name,
            })?;

        match tokens.get(index) {
            Some(token) => {
                let value = convert(token).map_err(|source| ParseError::ParseFailed {
                    index,
                    param: param.name.clone(),
                    token: token.clone(),
                    source,
                })?;
                values.push(Some(value));
            }
            None if param.optional => values.push(None),
            None => {
                return Err(ParseError::MissingArgument {
                    index,
                    param: param.name.clone(),
                });
            }
        }
    }

    Ok(Args {
        names: params.iter().map(|p| p.name.clone()).collect(),
        values,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn int_float() -> [Param; 2] {
        [Param::new::<i64>("count"), Param::new::<f64>("ratio")]
    }

    #[test]
    fn coerces_int_and_float() {
        let args = parse(&int_float(), &tokens(&["3", "2.5"]), &ConverterRegistry::default())
            .unwrap();
        assert_eq!(args.get::<i64>(0), Some(&3));
        assert_eq!(args.get::<f64>(1), Some(&2.5));
        assert_eq!(args.value::<f64>("ratio"), Some(&2.5));
        assert_eq!(args.get::<String>(0), None);
    }

    #[test]
    fn bad_token_identifies_first_param() {
        let err = parse(&int_float(), &tokens(&["x", "2.5"]), &ConverterRegistry::default())
            .unwrap_err();
        match err {
            ParseError::ParseFailed {
                index, param, token, ..
            } => {
                assert_eq!(index, 0);
                assert_eq!(param, "count");
                assert_eq!(token, "x");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn too_many_arguments() {
        let err = parse(
            &int_float(),
            &tokens(&["1", "2", "3"]),
            &ConverterRegistry::default(),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            ParseError::TooManyArguments {
                expected: 2,
                got: 3
            }
        ));
    }

    #[test]
    fn missing_converter() {
        struct Unknown;
        let params = [Param::new::<Unknown>("thing")];
        let err = parse(&params, &tokens(&["a"]), &ConverterRegistry::default()).unwrap_err();
        assert!(matches!(err, ParseError::NoParseFunction { index: 0, .. }));
    }

    #[test]
    fn optional_and_missing() {
        let registry = ConverterRegistry::default();
        let params = [Param::new::<String>("who"), Param::optional::<i32>("times")];

        let args = parse(&params, &tokens(&["bob"]), &registry).unwrap();
        assert_eq!(args.get::<String>(0).map(String::as_str), Some("bob"));
        assert_eq!(args.get::<i32>(1), None);

        let err = parse(&params, &[], &registry).unwrap_err();
        assert!(matches!(err, ParseError::MissingArgument { index: 0, .. }));
    }

    #[test]
    fn builtin_mention_and_bool() {
        let registry = ConverterRegistry::default();
        let params = [Param::new::<Mention>("user"), Param::new::<bool>("loud")];
        let args = parse(&params, &tokens(&["(met)1234(met)", "yes"]), &registry).unwrap();
        assert_eq!(args.get::<Mention>(0), Some(&Mention("1234".into())));
        assert_eq!(args.get::<bool>(1), Some(&true));
    }

    #[test]
    fn custom_converter() {
        #[derive(Debug, PartialEq)]
        struct Dice(u32, u32);

        let mut registry = ConverterRegistry::default();
        registry.register::<Dice, _, _>(|s: &str| -> Result<Dice, ConvertError> {
            let (n, sides) = s
                .split_once('d')
                .ok_or_else(|| ConvertError("expected NdM".into()))?;
            let num = |v: &str| {
                v.parse::<u32>()
                    .map_err(|_| ConvertError(format!("bad number {v}")))
            };
            Ok(Dice(num(n)?, num(sides)?))
        });

        let args = parse(&[Param::new::<Dice>("dice")], &tokens(&["2d6"]), &registry).unwrap();
        assert_eq!(args.get::<Dice>(0), Some(&Dice(2, 6)));
    }
}
