//! Resolution and ABI encoding of constructor arguments

use std::collections::HashMap;

use alloy::{
    dyn_abi::{DynSolType, DynSolValue, JsonAbiExt, Specifier},
    json_abi::JsonAbi,
    primitives::{Address, Bytes},
};
use serde_json::Value;

use crate::{
    artifacts::Artifact,
    errors::CalldataError,
    manifest::{parse_reference, unescape_literal},
};

/// The addresses of targets deployed so far, keyed by label
pub type AddressBook = HashMap<String, Address>;

/// Build the creation calldata of a contract: its bytecode followed by the
/// ABI-encoded constructor arguments.
///
/// References to earlier targets are resolved against `addresses`.
pub fn deployment_code(
    artifact: &Artifact,
    args: &[Value],
    addresses: &AddressBook,
) -> Result<Bytes, CalldataError> {
    let encoded_args = encode_constructor_args(&artifact.contract, &artifact.abi, args, addresses)?;

    let mut code = Vec::with_capacity(artifact.bytecode.len() + encoded_args.len());
    code.extend_from_slice(&artifact.bytecode);
    code.extend_from_slice(&encoded_args);
    Ok(code.into())
}

/// ABI-encode constructor arguments against the constructor in `abi`
pub fn encode_constructor_args(
    contract: &str,
    abi: &JsonAbi,
    args: &[Value],
    addresses: &AddressBook,
) -> Result<Vec<u8>, CalldataError> {
    let constructor = match &abi.constructor {
        Some(constructor) => constructor,
        None if args.is_empty() => return Ok(Vec::new()),
        None => {
            return Err(CalldataError::ArgumentCount {
                contract: contract.to_string(),
                expected: 0,
                got: args.len(),
            })
        },
    };

    if constructor.inputs.len() != args.len() {
        return Err(CalldataError::ArgumentCount {
            contract: contract.to_string(),
            expected: constructor.inputs.len(),
            got: args.len(),
        });
    }

    let values = constructor
        .inputs
        .iter()
        .zip(args)
        .enumerate()
        .map(|(index, (param, arg))| {
            let signature = param.selector_type().into_owned();
            let ty = param.resolve().map_err(|e| CalldataError::InvalidArgument {
                index,
                param: signature.clone(),
                reason: e.to_string(),
            })?;
            coerce_value(&ty, arg, &ArgContext { index, param: &signature, addresses })
        })
        .collect::<Result<Vec<_>, _>>()?;

    constructor
        .abi_encode_input(&values)
        .map_err(|e| CalldataError::Encoding(e.to_string()))
}

/// The argument being coerced, for error reporting and reference lookup
struct ArgContext<'a> {
    /// The argument position
    index: usize,
    /// The parameter signature
    param: &'a str,
    /// The addresses references resolve against
    addresses: &'a AddressBook,
}

impl ArgContext<'_> {
    /// An invalid argument error for this argument
    fn invalid(&self, reason: impl ToString) -> CalldataError {
        CalldataError::InvalidArgument {
            index: self.index,
            param: self.param.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Coerce a JSON argument into a value of the given type.
///
/// JSON arrays map onto Solidity arrays and tuples element-wise; every other
/// value goes through the string coercion of its type.
fn coerce_value(
    ty: &DynSolType,
    value: &Value,
    ctx: &ArgContext<'_>,
) -> Result<DynSolValue, CalldataError> {
    match (ty, value) {
        (DynSolType::Array(inner), Value::Array(values)) => values
            .iter()
            .map(|v| coerce_value(inner, v, ctx))
            .collect::<Result<Vec<_>, _>>()
            .map(DynSolValue::Array),
        (DynSolType::FixedArray(inner, len), Value::Array(values)) => {
            if values.len() != *len {
                return Err(ctx.invalid(format!(
                    "expected {len} elements, got {}",
                    values.len()
                )));
            }
            values
                .iter()
                .map(|v| coerce_value(inner, v, ctx))
                .collect::<Result<Vec<_>, _>>()
                .map(DynSolValue::FixedArray)
        },
        (DynSolType::Tuple(types), Value::Array(values)) => {
            if values.len() != types.len() {
                return Err(ctx.invalid(format!(
                    "expected {} tuple fields, got {}",
                    types.len(),
                    values.len()
                )));
            }
            types
                .iter()
                .zip(values)
                .map(|(ty, v)| coerce_value(ty, v, ctx))
                .collect::<Result<Vec<_>, _>>()
                .map(DynSolValue::Tuple)
        },
        (_, Value::Array(_)) => Err(ctx.invalid(format!(
            "expected {}, got an array",
            ty.sol_type_name()
        ))),
        (_, Value::Object(_) | Value::Null) => Err(CalldataError::UnsupportedValue(ctx.index)),
        (_, scalar) => {
            let s = scalar_string(scalar, ctx)?;
            ty.coerce_str(&s).map_err(|e| ctx.invalid(e))
        },
    }
}

/// The string form of a scalar argument, with references replaced by addresses
///
/// JSON numbers outside the 64-bit integer range are parsed as floats and have
/// lost precision, so they are rejected rather than encoded.
fn scalar_string(value: &Value, ctx: &ArgContext<'_>) -> Result<String, CalldataError> {
    match value {
        Value::String(s) => match parse_reference(s) {
            Some(label) => ctx
                .addresses
                .get(label)
                .map(|address| address.to_string())
                .ok_or_else(|| CalldataError::UnresolvedReference(label.to_string())),
            None => Ok(unescape_literal(s).to_string()),
        },
        Value::Number(n) if n.is_u64() || n.is_i64() => Ok(n.to_string()),
        Value::Number(n) => Err(ctx.invalid(format!(
            "`{n}` is not an exact integer; quote large integers as strings"
        ))),
        other => Ok(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use alloy::primitives::{address, U256};
    use serde_json::json;

    use super::*;

    /// The address `TokenA` is deployed at
    const TOKEN_A: Address = address!("5FbDB2315678afecb367f032d93F642f64180aa3");

    /// `constructor(address token, uint256 cap, address[] owners)`
    fn vault_abi() -> JsonAbi {
        serde_json::from_value(json!([{
            "type": "constructor",
            "stateMutability": "nonpayable",
            "inputs": [
                { "name": "token", "type": "address", "internalType": "address" },
                { "name": "cap", "type": "uint256", "internalType": "uint256" },
                { "name": "owners", "type": "address[]", "internalType": "address[]" }
            ]
        }]))
        .unwrap()
    }

    /// An address book holding `TokenA`
    fn addresses() -> AddressBook {
        HashMap::from([("TokenA".to_string(), TOKEN_A)])
    }

    #[test]
    fn test_references_resolve_to_addresses() {
        let args = [json!("<TokenA>"), json!(1000), json!(["<TokenA address>"])];
        let encoded = encode_constructor_args("Vault", &vault_abi(), &args, &addresses()).unwrap();

        let expected = DynSolValue::Tuple(vec![
            DynSolValue::Address(TOKEN_A),
            DynSolValue::Uint(U256::from(1000), 256),
            DynSolValue::Array(vec![DynSolValue::Address(TOKEN_A)]),
        ])
        .abi_encode_params();
        assert_eq!(encoded, expected);
    }

    #[test]
    fn test_unresolved_reference() {
        let args = [json!("<TokenB>"), json!(1), json!([])];
        assert_eq!(
            encode_constructor_args("Vault", &vault_abi(), &args, &addresses()).unwrap_err(),
            CalldataError::UnresolvedReference("TokenB".to_string())
        );
    }

    #[test]
    fn test_argument_count_mismatch() {
        let err = encode_constructor_args("Vault", &vault_abi(), &[json!("<TokenA>")], &addresses())
            .unwrap_err();
        assert_eq!(
            err,
            CalldataError::ArgumentCount {
                contract: "Vault".to_string(),
                expected: 3,
                got: 1,
            }
        );

        // A contract without a constructor takes no arguments
        let err = encode_constructor_args("Token", &JsonAbi::default(), &[json!(1)], &addresses())
            .unwrap_err();
        assert!(matches!(err, CalldataError::ArgumentCount { expected: 0, got: 1, .. }));
        assert!(encode_constructor_args("Token", &JsonAbi::default(), &[], &addresses())
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_invalid_arguments() {
        let args = [json!("not an address"), json!(1), json!([])];
        assert!(matches!(
            encode_constructor_args("Vault", &vault_abi(), &args, &addresses()),
            Err(CalldataError::InvalidArgument { index: 0, .. })
        ));

        let args = [json!("<TokenA>"), json!({ "amount": 1 }), json!([])];
        assert_eq!(
            encode_constructor_args("Vault", &vault_abi(), &args, &addresses()).unwrap_err(),
            CalldataError::UnsupportedValue(1)
        );

        let args = [json!(["<TokenA>"]), json!(1), json!([])];
        assert!(matches!(
            encode_constructor_args("Vault", &vault_abi(), &args, &addresses()),
            Err(CalldataError::InvalidArgument { index: 0, .. })
        ));
    }

    #[test]
    fn test_large_integers_must_be_quoted() {
        let cap: Value = serde_json::from_str("123456789012345678901234").unwrap();
        let args = [json!("<TokenA>"), cap, json!([])];
        assert!(matches!(
            encode_constructor_args("Vault", &vault_abi(), &args, &addresses()),
            Err(CalldataError::InvalidArgument { index: 1, .. })
        ));

        let args = [json!("<TokenA>"), json!("123456789012345678901234"), json!([])];
        let encoded = encode_constructor_args("Vault", &vault_abi(), &args, &addresses()).unwrap();
        let expected = DynSolValue::Tuple(vec![
            DynSolValue::Address(TOKEN_A),
            DynSolValue::Uint(U256::from(123456789012345678901234u128), 256),
            DynSolValue::Array(vec![]),
        ])
        .abi_encode_params();
        assert_eq!(encoded, expected);

        // Integers within 64 bits are exact, negative ones included
        let abi: JsonAbi = serde_json::from_value(json!([{
            "type": "constructor",
            "stateMutability": "nonpayable",
            "inputs": [{ "name": "offset", "type": "int64", "internalType": "int64" }]
        }]))
        .unwrap();
        assert!(encode_constructor_args("Offset", &abi, &[json!(-5)], &addresses()).is_ok());
        assert!(encode_constructor_args("Offset", &abi, &[json!(1.5)], &addresses()).is_err());
    }

    #[test]
    fn test_escaped_string_is_literal() {
        let abi: JsonAbi = serde_json::from_value(json!([{
            "type": "constructor",
            "stateMutability": "nonpayable",
            "inputs": [{ "name": "tag", "type": "string", "internalType": "string" }]
        }]))
        .unwrap();

        let encoded = encode_constructor_args("Tag", &abi, &[json!("<<b>")], &addresses()).unwrap();
        let expected =
            DynSolValue::Tuple(vec![DynSolValue::String("<b>".to_string())]).abi_encode_params();
        assert_eq!(encoded, expected);

        assert_eq!(
            encode_constructor_args("Tag", &abi, &[json!("<b>")], &addresses()).unwrap_err(),
            CalldataError::UnresolvedReference("b".to_string())
        );
    }
}
