//! Extension dispatch: `value:name(args)`
//!
//! Built-in extensions are chosen by the receiver's kind. A refbox function
//! can be promoted to a user extension with
//! `extension(kind, refbox, function, arity)`; the receiver is passed as its
//! first parameter.

use super::error::{InterpResult, RuntimeError};
use super::eval::Interpreter;
use super::{InstanceRef, Value};
use crate::ast::{Access, FunctionDef, Node};
use std::rc::Rc;
use tracing::{debug, trace};

/// Receiver kind a user extension applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtensionKind {
    String,
    Int,
    RefBox,
    Array,
}

impl ExtensionKind {
    pub fn parse(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "string" => Some(ExtensionKind::String),
            "int" => Some(ExtensionKind::Int),
            "refbox" => Some(ExtensionKind::RefBox),
            "array" => Some(ExtensionKind::Array),
            _ => None,
        }
    }

    pub fn matches(self, value: &Value) -> bool {
        matches!(
            (self, value),
            (ExtensionKind::String, Value::Str(_))
                | (ExtensionKind::Int, Value::Int(_))
                | (ExtensionKind::RefBox, Value::Object(_))
                | (ExtensionKind::Array, Value::Array(_))
        )
    }
}

/// refbox function promoted to an extension
#[derive(Debug, Clone)]
pub struct UserExtension {
    pub kind: ExtensionKind,
    pub function: Rc<FunctionDef>,
}

impl UserExtension {
    /// Number of call-site arguments, excluding the receiver
    pub fn arity(&self) -> usize {
        self.function.params.len().saturating_sub(1)
    }
}

fn expect_args(name: &str, args: &[Value], allowed: &[usize]) -> InterpResult<()> {
    if allowed.contains(&args.len()) {
        return Ok(());
    }
    let expected = allowed
        .iter()
        .map(|n| n.to_string())
        .collect::<Vec<_>>()
        .join(" or ");
    Err(RuntimeError::argument(format!(
        "extension '{name}' expects {expected} argument(s), got {}",
        args.len()
    )))
}

fn int_arg(name: &str, value: &Value) -> InterpResult<i64> {
    match value {
        Value::Int(n) => Ok(*n),
        other => Err(RuntimeError::argument(format!(
            "extension '{name}' expects an Int argument, got {}",
            other.kind_name()
        ))),
    }
}

fn str_arg<'a>(name: &str, value: &'a Value) -> InterpResult<&'a str> {
    match value {
        Value::Str(s) => Ok(s),
        other => Err(RuntimeError::argument(format!(
            "extension '{name}' expects a String argument, got {}",
            other.kind_name()
        ))),
    }
}

fn position(name: &str, index: i64, len: usize, inclusive: bool) -> InterpResult<usize> {
    let limit = if inclusive { len + 1 } else { len };
    usize::try_from(index)
        .ok()
        .filter(|&i| i < limit)
        .ok_or_else(|| {
            RuntimeError::argument(format!(
                "extension '{name}': index {index} out of range for length {len}"
            ))
        })
}

/// `a:replaceat(i, j, .., value)` writes `a[i][j]..`
fn replace_nested(items: &mut [Value], indices: &[i64], value: Value) -> InterpResult<()> {
    let Some((&first, rest)) = indices.split_first() else {
        return Err(RuntimeError::argument("extension 'replaceat' needs an index"));
    };
    let i = position("replaceat", first, items.len(), false)?;
    if rest.is_empty() {
        items[i] = value;
        return Ok(());
    }
    match &mut items[i] {
        Value::Array(inner) => replace_nested(inner, rest, value),
        other => Err(RuntimeError::argument(format!(
            "extension 'replaceat': element {first} is {}, not an Array",
            other.kind_name()
        ))),
    }
}

fn array_extension(name: &str, mut items: Vec<Value>, args: Vec<Value>) -> InterpResult<Option<Value>> {
    let value = match name {
        "length" => {
            expect_args(name, &args, &[0])?;
            Value::from(items.len())
        }
        "reverse" => {
            expect_args(name, &args, &[0])?;
            items.reverse();
            Value::Array(items)
        }
        "tostring" => {
            expect_args(name, &args, &[0, 1])?;
            let separator = match args.first() {
                Some(sep) => str_arg(name, sep)?,
                None => "",
            };
            let parts: Vec<String> = items.iter().map(Value::to_text).collect();
            Value::Str(parts.join(separator))
        }
        "removeat" => {
            expect_args(name, &args, &[1])?;
            if args[0].is_void() {
                return Err(RuntimeError::argument("extension 'removeat' requires a value"));
            }
            let i = position(name, int_arg(name, &args[0])?, items.len(), false)?;
            items.remove(i);
            Value::Array(items)
        }
        "append" => {
            expect_args(name, &args, &[1])?;
            items.extend(args);
            Value::Array(items)
        }
        "addat" => {
            expect_args(name, &args, &[2])?;
            let mut args = args.into_iter();
            let (at, value) = (args.next(), args.next());
            let (Some(at), Some(value)) = (at, value) else {
                return Err(RuntimeError::argument("extension 'addat' expects 2 argument(s)"));
            };
            let i = position(name, int_arg(name, &at)?, items.len(), true)?;
            items.insert(i, value);
            Value::Array(items)
        }
        "prepend" => {
            expect_args(name, &args, &[1])?;
            let mut out = args;
            out.extend(items);
            Value::Array(out)
        }
        "replaceat" => {
            if args.len() < 2 {
                return Err(RuntimeError::argument(
                    "extension 'replaceat' expects at least 2 arguments",
                ));
            }
            let mut args = args;
            let value = args.pop().unwrap_or(Value::Void);
            let indices = args
                .iter()
                .map(|arg| int_arg(name, arg))
                .collect::<InterpResult<Vec<_>>>()?;
            replace_nested(&mut items, &indices, value)?;
            Value::Array(items)
        }
        "has" | "contains" => {
            expect_args(name, &args, &[1])?;
            Value::from(items.contains(&args[0]))
        }
        _ => return Ok(None),
    };
    Ok(Some(value))
}

fn string_extension(name: &str, s: &str, args: Vec<Value>) -> InterpResult<Option<Value>> {
    if matches!(
        name,
        "tolower" | "toupper" | "reverse" | "toarray" | "length" | "toint" | "canconverttoint"
    ) {
        expect_args(name, &args, &[0])?;
    }
    let value = match name {
        "tolower" => Value::Str(s.to_lowercase()),
        "toupper" => Value::Str(s.to_uppercase()),
        "reverse" => Value::Str(s.chars().rev().collect()),
        "toarray" => Value::Array(s.chars().map(|c| Value::Str(c.to_string())).collect()),
        "length" => Value::from(s.chars().count()),
        "split" => {
            expect_args(name, &args, &[0, 1])?;
            let parts: Vec<Value> = match args.first() {
                Some(sep) => {
                    let sep = str_arg(name, sep)?;
                    if sep.is_empty() {
                        vec![Value::from(s)]
                    } else {
                        s.split(sep).map(Value::from).collect()
                    }
                }
                None => s.split(char::is_whitespace).map(Value::from).collect(),
            };
            Value::Array(parts)
        }
        "replaceat" => {
            expect_args(name, &args, &[2])?;
            let index = int_arg(name, &args[0])?;
            let replacement = str_arg(name, &args[1])?;
            let chars: Vec<char> = s.chars().collect();
            let i = position(name, index, chars.len(), false)?;
            let mut out: String = chars[..i].iter().collect();
            out.push_str(replacement);
            out.extend(&chars[i + 1..]);
            Value::Str(out)
        }
        "toint" => match s.trim().parse::<i64>() {
            Ok(n) => Value::Int(n),
            Err(_) => {
                return Err(RuntimeError::argument(format!(
                    "cannot convert \"{s}\" to Int"
                )))
            }
        },
        "canconverttoint" => Value::from(s.trim().parse::<i64>().is_ok()),
        _ => return Ok(None),
    };
    Ok(Some(value))
}

impl Interpreter {
    pub(super) fn eval_extension(&mut self, target: &Node, name: &str, args: &[Node]) -> InterpResult<Value> {
        let receiver = self.eval(target)?;
        if receiver.is_void() {
            return Ok(Value::Void);
        }
        let name = name.to_lowercase();
        trace!(extension = %name, receiver = receiver.kind_name(), "extension");

        if name == "type" {
            return Ok(Value::from(receiver.kind_name()));
        }

        let user = self.state.extensions.borrow().get(&name).cloned();
        if let Some(ext) = user {
            if ext.kind.matches(&receiver) && ext.arity() == args.len() {
                let mut values = Vec::with_capacity(args.len() + 1);
                values.push(receiver);
                values.extend(self.eval_args(args)?);
                return self.invoke(&ext.function, values);
            }
        }

        let values = self.eval_args(args)?;
        let result = match &receiver {
            Value::Array(items) => array_extension(&name, items.clone(), values)?,
            Value::Str(s) => string_extension(&name, s, values)?,
            Value::Int(n) if name == "tostring" => {
                expect_args(&name, &values, &[0])?;
                Some(Value::Str(n.to_string()))
            }
            Value::Object(instance) => self.refbox_extension(&name, instance, values)?,
            _ => None,
        };
        result.ok_or_else(|| RuntimeError::extension_not_found(&name))
    }

    fn refbox_extension(
        &mut self,
        name: &str,
        instance: &InstanceRef,
        args: Vec<Value>,
    ) -> InterpResult<Option<Value>> {
        let include_guarded = |flag: Option<&Value>, default: bool| -> InterpResult<bool> {
            match flag {
                Some(flag) => Ok(int_arg(name, flag)? != 0),
                None => Ok(default),
            }
        };
        let value = match name {
            "isinstanceof" => {
                expect_args(name, &args, &[1])?;
                let refbox = str_arg(name, &args[0])?;
                Value::from(self.is_instance_of(instance, refbox)?)
            }
            "hasfield" => {
                expect_args(name, &args, &[1, 2])?;
                let field = str_arg(name, &args[0])?;
                let guarded = include_guarded(args.get(1), false)?;
                let found = instance.borrow().field_names(guarded).any(|f| f == field);
                Value::from(found)
            }
            "hasfunction" => {
                expect_args(name, &args, &[2, 3])?;
                let function = str_arg(name, &args[0])?;
                let arity = int_arg(name, &args[1])?;
                // every function slot counts unless Guarded ones are excluded with 0
                let guarded = include_guarded(args.get(2), true)?;
                let found = instance
                    .borrow()
                    .function_keys(guarded)
                    .any(|key| key.name == function && i64::try_from(key.arity).ok() == Some(arity));
                Value::from(found)
            }
            "reflectionsetfield" => {
                expect_args(name, &args, &[2])?;
                let field = str_arg(name, &args[0])?;
                if !instance.borrow_mut().set_field(field, args[1].clone()) {
                    return Err(RuntimeError::argument(format!(
                        "extension 'reflectionsetfield': no field '{field}'"
                    )));
                }
                Value::Void
            }
            _ => return Ok(None),
        };
        Ok(Some(value))
    }

    /// `extension(kind, refbox, function, arity)`
    pub(super) fn register_extension(
        &mut self,
        kind: &Node,
        refbox: &Node,
        function: &Node,
        arity: &Node,
    ) -> InterpResult<()> {
        let kind = self.eval(kind)?;
        let refbox = self.eval(refbox)?;
        let function = self.eval(function)?;
        let arity = self.eval(arity)?;

        let (Value::Str(kind), Value::Str(refbox), Value::Str(function), Value::Int(arity)) =
            (&kind, &refbox, &function, &arity)
        else {
            return Err(RuntimeError::argument(
                "extension declaration expects (String, String, String, Int)",
            ));
        };
        if *arity < 1 {
            return Err(RuntimeError::argument(
                "extension function needs at least one parameter",
            ));
        }
        let kind = ExtensionKind::parse(kind)
            .ok_or_else(|| RuntimeError::argument(format!("invalid extension kind '{kind}'")))?;

        let def = self.box_definition(refbox)?;
        if !def.is_const {
            return Err(RuntimeError::definition(format!(
                "refbox '{refbox}' must be const to provide extensions"
            )));
        }
        if def.is_abstract {
            return Err(RuntimeError::definition(format!(
                "refbox '{refbox}' cannot be abstract"
            )));
        }
        let method = def
            .functions
            .iter()
            .find(|m| m.function.name == *function && i64::try_from(m.function.params.len()).ok() == Some(*arity))
            .ok_or_else(|| {
                RuntimeError::definition(format!(
                    "function '{function}' with {arity} parameter(s) not found in refbox '{refbox}'"
                ))
            })?;
        if method.access == Access::Guarded {
            return Err(RuntimeError::definition(format!(
                "function '{function}' must be exposed to be an extension"
            )));
        }

        debug!(extension = %function, ?kind, refbox = %refbox, "register extension");
        let ext = UserExtension {
            kind,
            function: method.function.clone(),
        };
        self.state
            .extensions
            .borrow_mut()
            .insert(function.to_lowercase(), ext);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interp::error::ErrorKind;
    use crate::ScriptError;
    use std::cell::RefCell;
    use std::io::Cursor;

    fn run(source: &str) -> Result<String, ScriptError> {
        let buffer = Rc::new(RefCell::new(Vec::new()));
        let input = Rc::new(RefCell::new(Cursor::new(Vec::new())));
        let mut interp = Interpreter::with_io(buffer.clone(), input);
        interp.run_source(source)?;
        let out = String::from_utf8(buffer.borrow().clone()).unwrap();
        Ok(out)
    }

    fn output(source: &str) -> String {
        run(source).expect("program should run")
    }

    fn kind(source: &str) -> ErrorKind {
        match run(source) {
            Err(ScriptError::Runtime(e)) => e.kind,
            other => panic!("expected runtime error, got {other:?}"),
        }
    }

    #[test]
    fn test_type_extension() {
        assert_eq!(
            output("print 1:type() print \"a\":type() print [1]:type()"),
            "Int\nString\nArray\n"
        );
    }

    #[test]
    fn test_names_are_case_insensitive() {
        assert_eq!(output("print \"abc\":ToUpper()"), "ABC\n");
    }

    #[test]
    fn test_array_builtins() {
        assert_eq!(output("print [1, 2, 3]:length()"), "3\n");
        assert_eq!(output("print [1, 2, 3]:reverse()"), "[3, 2, 1]\n");
        assert_eq!(output("print [1, \"a\", 3]:tostring(\"-\")"), "1-a-3\n");
        assert_eq!(output("print [1, 2]:tostring()"), "12\n");
        assert_eq!(output("print [1, 2, 3]:removeat(1)"), "[1, 3]\n");
        assert_eq!(output("print [1, 2]:addat(2, 9)"), "[1, 2, 9]\n");
        assert_eq!(output("print [1, 2]:prepend(0)"), "[0, 1, 2]\n");
        assert_eq!(output("print [[1, 2], [3, 4]]:replaceat(1, 0, 7)"), "[[1, 2], [7, 4]]\n");
        assert_eq!(output("print [1, 2]:has(2) print [1, 2]:contains(5)"), "1\n0\n");
    }

    #[test]
    fn test_array_builtins_copy_receiver() {
        assert_eq!(output("a = [1, 2] b = a:append(3) print a print b"), "[1, 2]\n[1, 2, 3]\n");
    }

    #[test]
    fn test_array_argument_errors() {
        assert_eq!(kind("print [1]:removeat(3)"), ErrorKind::ArgumentError);
        assert_eq!(kind("print [1]:removeat(\"x\")"), ErrorKind::ArgumentError);
        assert_eq!(kind("print [1]:append()"), ErrorKind::ArgumentError);
        assert_eq!(kind("print [1]:replaceat(0)"), ErrorKind::ArgumentError);
        assert_eq!(kind("print [1]:tostring(1)"), ErrorKind::ArgumentError);
    }

    #[test]
    fn test_string_builtins() {
        assert_eq!(output("print \"AbC\":tolower()"), "abc\n");
        assert_eq!(output("print \"abc\":reverse()"), "cba\n");
        assert_eq!(output("print \"ab\":toarray()"), "[\"a\", \"b\"]\n");
        assert_eq!(output("print \"héllo\":length()"), "5\n");
        assert_eq!(output("print \"a,b\":split(\",\")"), "[\"a\", \"b\"]\n");
        assert_eq!(output("print \"a b\":split()"), "[\"a\", \"b\"]\n");
        assert_eq!(output("print \"cat\":replaceat(0, \"b\")"), "bat\n");
        assert_eq!(output("print \" 42 \":toint() + 1"), "43\n");
        assert_eq!(output("print \"4x\":canconverttoint()"), "0\n");
    }

    #[test]
    fn test_string_builtins_without_parameters_reject_arguments() {
        for name in ["tolower", "toupper", "reverse", "toarray", "length", "toint", "canconverttoint"] {
            assert_eq!(kind(&format!("print \"1\":{name}(2)")), ErrorKind::ArgumentError, "{name}");
        }
    }

    #[test]
    fn test_string_toint_fails_on_text() {
        assert_eq!(kind("print \"abc\":toint()"), ErrorKind::ArgumentError);
    }

    #[test]
    fn test_int_tostring() {
        assert_eq!(output("print 12:tostring() + \"3\""), "123\n");
    }

    #[test]
    fn test_void_receiver_yields_void() {
        assert_eq!(
            output("function nothing() return void print nothing():length()"),
            "(void)\n"
        );
    }

    #[test]
    fn test_unknown_extension() {
        assert_eq!(kind("print 1:length()"), ErrorKind::ExtensionNotFound);
        assert_eq!(kind("print [1]:frobnicate()"), ErrorKind::ExtensionNotFound);
    }

    const POINT: &str = "
        refbox Point
            x = 1
            guarded y = 2
            function get() return x
            guarded function hidden() return y
        end
        p = create Point
    ";

    #[test]
    fn test_refbox_introspection() {
        let out = output(&format!(
            "{POINT}
             print p:isinstanceof(\"Point\")
             print p:hasfield(\"y\")
             print p:hasfield(\"y\", 1)
             print p:hasfunction(\"get\", 0)
             print p:hasfunction(\"hidden\", 0)
             print p:hasfunction(\"hidden\", 0, 0)
             print p:hasfunction(\"hidden\", 0, 1)
             print p:hasfunction(\"get\", 1)"
        ));
        assert_eq!(out, "1\n0\n1\n1\n1\n0\n1\n0\n");
    }

    #[test]
    fn test_isinstanceof_is_structural() {
        let out = output(&format!(
            "{POINT}
             refbox Other z = 0 end
             refbox Twin x = 5 guarded y = 0 function get() return x guarded function hidden() return y end
             print p:isinstanceof(\"Other\")
             print p:isinstanceof(\"Twin\")"
        ));
        assert_eq!(out, "0\n1\n");
    }

    #[test]
    fn test_self_referencing_instance_prints() {
        let out = output(
            "refbox Node me = 0 end
             n = create Node
             n:reflectionsetfield(\"me\", n)
             print n
             print [n]"
        );
        assert_eq!(out, "{me: {Node ...}}\n[{me: {Node ...}}]\n");
    }

    #[test]
    fn test_reflection_set_field_bypasses_access() {
        let out = output(&format!(
            "{POINT} p:reflectionsetfield(\"y\", 40) print p:hasfield(\"y\", 1) print p.x"
        ));
        assert_eq!(out, "1\n1\n");
        assert_eq!(
            kind(&format!("{POINT} p:reflectionsetfield(\"nope\", 1)")),
            ErrorKind::ArgumentError
        );
    }

    const EXTENSIONS: &str = "
        const refbox Ext
            function double(a) return a + a
            function sum(a) return a:tostring(\"+\")
            function wrap(s, left, right) return left + s + right
            guarded function secret(a) return a
        end
    ";

    #[test]
    fn test_user_extension_takes_receiver_first() {
        let out = output(&format!(
            "{EXTENSIONS}
             extension(\"string\", \"Ext\", \"wrap\", 3)
             print \"x\":wrap(\"<\", \">\")"
        ));
        assert_eq!(out, "<x>\n");
    }

    #[test]
    fn test_user_extension_overrides_builtin_for_its_kind() {
        let out = output(&format!(
            "{EXTENSIONS}
             extension(\"array\", \"Ext\", \"double\", 1)
             print [1, 2]:DOUBLE()
             print \"ab\":reverse()"
        ));
        assert_eq!(out, "[1, 2, 1, 2]\nba\n");
    }

    #[test]
    fn test_user_extension_kind_must_match() {
        assert_eq!(
            kind(&format!(
                "{EXTENSIONS} extension(\"int\", \"Ext\", \"double\", 1) print \"a\":double()"
            )),
            ErrorKind::ExtensionNotFound
        );
    }

    #[test]
    fn test_extension_declaration_errors() {
        assert_eq!(
            kind("refbox Loose function f(a) return a end extension(\"int\", \"Loose\", \"f\", 1)"),
            ErrorKind::DefinitionError
        );
        assert_eq!(
            kind(&format!("{EXTENSIONS} extension(\"int\", \"Ext\", \"secret\", 1)")),
            ErrorKind::DefinitionError
        );
        assert_eq!(
            kind(&format!("{EXTENSIONS} extension(\"int\", \"Ext\", \"double\", 2)")),
            ErrorKind::DefinitionError
        );
        assert_eq!(
            kind(&format!("{EXTENSIONS} extension(\"float\", \"Ext\", \"double\", 1)")),
            ErrorKind::ArgumentError
        );
        assert_eq!(
            kind(&format!("{EXTENSIONS} extension(\"int\", \"Ext\", \"double\", 0)")),
            ErrorKind::ArgumentError
        );
        assert_eq!(
            kind("extension(\"int\", \"Missing\", \"f\", 1)"),
            ErrorKind::DefinitionError
        );
    }

    #[test]
    fn test_extension_kind_parse() {
        assert_eq!(ExtensionKind::parse("Array"), Some(ExtensionKind::Array));
        assert_eq!(ExtensionKind::parse("float"), None);
        assert!(!ExtensionKind::RefBox.matches(&Value::Void));
    }
}
