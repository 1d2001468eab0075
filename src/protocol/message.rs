use crate::protocol::error::{ProtocolError, Result};
use crate::protocol::value::Value;
use crate::protocol::xml::{self, Reader};
use std::collections::BTreeMap;
use std::fmt;

/// Decoded `<methodCall>`
#[derive(Debug, Clone, PartialEq)]
pub struct MethodCall {
    pub name: String,
    pub params: Vec<Value>,
}

impl MethodCall {
    pub fn new(name: impl Into<String>, params: Vec<Value>) -> Self {
        Self {
            name: name.into(),
            params,
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = String::with_capacity(128);
        out.push_str(xml::XML_DECLARATION);
        out.push_str("<methodCall><methodName>");
        xml::escape_into(&mut out, &self.name);
        out.push_str("</methodName><params>");
        for param in &self.params {
            out.push_str("<param>");
            xml::write_value(&mut out, param);
            out.push_str("</param>");
        }
        out.push_str("</params></methodCall>\r\n");
        out.into_bytes()
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let mut reader = Reader::new(utf8(bytes)?)?;

        reader.open("methodCall")?;
        let name = if reader.open("methodName")? {
            reader.text("methodName")?.trim().to_string()
        } else {
            String::new()
        };
        if name.is_empty() {
            return Err(ProtocolError::InvalidScalar {
                kind: "methodName",
                text: name,
            });
        }

        let mut params = Vec::new();
        if reader.peek_element() == Some("params") && reader.open("params")? {
            while reader.peek_element() == Some("param") {
                reader.open("param")?;
                params.push(reader.value()?);
                reader.close("param")?;
            }
            reader.close("params")?;
        }

        reader.close("methodCall")?;
        reader.finish()?;

        Ok(Self { name, params })
    }
}

/// Decoded `<methodResponse>`: either a single result value or a fault
#[derive(Debug, Clone, PartialEq)]
pub enum MethodResponse {
    Success(Value),
    Fault(Fault),
}

impl MethodResponse {
    pub fn is_fault(&self) -> bool {
        matches!(self, MethodResponse::Fault(_))
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = String::with_capacity(160);
        out.push_str(xml::XML_DECLARATION);
        out.push_str("<methodResponse>");
        match self {
            MethodResponse::Success(value) => {
                out.push_str("<params><param>");
                xml::write_value(&mut out, value);
                out.push_str("</param></params>");
            }
            MethodResponse::Fault(fault) => {
                out.push_str("<fault>");
                xml::write_value(&mut out, &fault.to_value());
                out.push_str("</fault>");
            }
        }
        out.push_str("</methodResponse>\r\n");
        out.into_bytes()
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let mut reader = Reader::new(utf8(bytes)?)?;

        reader.open("methodResponse")?;
        let response = if reader.peek_element() == Some("fault") {
            reader.open("fault")?;
            let value = reader.value()?;
            reader.close("fault")?;
            MethodResponse::Fault(Fault::from_value(&value)?)
        } else {
            reader.open("params")?;
            reader.open("param")?;
            let value = reader.value()?;
            reader.close("param")?;
            reader.close("params")?;
            MethodResponse::Success(value)
        };
        reader.close("methodResponse")?;
        reader.finish()?;

        Ok(response)
    }
}

impl From<std::result::Result<Value, Fault>> for MethodResponse {
    fn from(result: std::result::Result<Value, Fault>) -> Self {
        match result {
            Ok(value) => MethodResponse::Success(value),
            Err(fault) => MethodResponse::Fault(fault),
        }
    }
}

/// XML-RPC fault with the conventional interoperability codes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fault {
    pub code: i32,
    pub message: String,
}

impl Fault {
    pub const PARSE_ERROR: i32 = -32700;
    pub const INVALID_REQUEST: i32 = -32600;
    pub const METHOD_NOT_FOUND: i32 = -32601;
    pub const INVALID_PARAMS: i32 = -32602;
    pub const INTERNAL_ERROR: i32 = -32603;

    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn parse_error(message: impl Into<String>) -> Self {
        Self::new(Self::PARSE_ERROR, message)
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(Self::INVALID_REQUEST, message)
    }

    pub fn method_not_found(method: &str) -> Self {
        Self::new(
            Self::METHOD_NOT_FOUND,
            format!("method {method:?} is not supported"),
        )
    }

    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::new(Self::INVALID_PARAMS, message)
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new(Self::INTERNAL_ERROR, message)
    }

    pub fn to_value(&self) -> Value {
        let mut members = BTreeMap::new();
        members.insert("faultCode".to_string(), Value::Int(self.code));
        members.insert(
            "faultString".to_string(),
            Value::String(self.message.clone()),
        );
        Value::Struct(members)
    }

    pub fn from_value(value: &Value) -> Result<Self> {
        let members = value
            .as_struct()
            .ok_or_else(|| ProtocolError::UnexpectedElement {
                expected: "fault struct".to_string(),
                found: format!("<{}>", value.type_name()),
            })?;

        let code = members
            .get("faultCode")
            .and_then(Value::as_i32)
            .ok_or_else(|| missing_member("faultCode"))?;
        let message = members
            .get("faultString")
            .and_then(Value::as_str)
            .ok_or_else(|| missing_member("faultString"))?;

        Ok(Self::new(code, message))
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "fault {}: {}", self.code, self.message)
    }
}

fn missing_member(name: &str) -> ProtocolError {
    ProtocolError::UnexpectedElement {
        expected: format!("{name} member"),
        found: "nothing".to_string(),
    }
}

fn utf8(bytes: &[u8]) -> Result<&str> {
    std::str::from_utf8(bytes).map_err(|e| ProtocolError::MalformedXml {
        offset: e.valid_up_to(),
        reason: "invalid UTF-8".to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    // Request body as sent by Python's xmlrpc.client
    const PYTHON_CALL: &str = "<?xml version='1.0'?>\n\
        <methodCall>\n\
        <methodName>unpack_data</methodName>\n\
        <params>\n\
        <param>\n\
        <value><string>address:10.0.0.50;message:hello</string></value>\n\
        </param>\n\
        </params>\n\
        </methodCall>\n";

    #[test]
    fn test_decode_python_call() {
        let call = MethodCall::decode(PYTHON_CALL.as_bytes()).unwrap();
        assert_eq!(call.name, "unpack_data");
        assert_eq!(call.params, vec![Value::from("address:10.0.0.50;message:hello")]);
    }

    #[test]
    fn test_decode_call_without_params() {
        let call =
            MethodCall::decode(b"<methodCall><methodName>ping</methodName></methodCall>").unwrap();
        assert!(call.params.is_empty());

        let call = MethodCall::decode(
            b"<methodCall><methodName>ping</methodName><params/></methodCall>",
        )
        .unwrap();
        assert!(call.params.is_empty());
    }

    #[test]
    fn test_decode_call_requires_method_name() {
        let err = MethodCall::decode(b"<methodCall><methodName> </methodName></methodCall>")
            .unwrap_err();
        assert!(matches!(
            err,
            ProtocolError::InvalidScalar {
                kind: "methodName",
                ..
            }
        ));
    }

    #[test]
    fn test_decode_rejects_trailing_content() {
        let err = MethodCall::decode(
            b"<methodCall><methodName>a</methodName></methodCall><extra/>",
        )
        .unwrap_err();
        assert!(matches!(err, ProtocolError::UnexpectedElement { .. }));
    }

    #[test]
    fn test_decode_rejects_invalid_utf8() {
        let err = MethodCall::decode(&[0x3c, 0xff, 0xfe]).unwrap_err();
        assert!(err.is_malformed_xml());
    }

    #[test]
    fn test_encode_acknowledgement_response() {
        let response = MethodResponse::Success(Value::Array(vec![Value::from("OK")]));
        let body = String::from_utf8(response.encode()).unwrap();
        assert!(body.starts_with("<?xml version=\"1.0\"?>"));
        assert!(body.contains(
            "<methodResponse><params><param><value><array><data>\
             <value><string>OK</string></value></data></array></value>\
             </param></params></methodResponse>"
        ));
    }

    #[test]
    fn test_fault_response_decodes() {
        let fault = Fault::invalid_params("expected 1 parameter");
        let encoded = MethodResponse::Fault(fault.clone()).encode();
        assert_eq!(
            MethodResponse::decode(&encoded).unwrap(),
            MethodResponse::Fault(fault)
        );
    }

    #[test]
    fn test_fault_from_value_requires_members() {
        let mut members = BTreeMap::new();
        members.insert("faultCode".to_string(), Value::Int(1));
        assert!(Fault::from_value(&Value::Struct(members)).is_err());
        assert!(Fault::from_value(&Value::from("nope")).is_err());
    }

    #[test]
    fn test_decode_python_style_response() {
        let body = "<?xml version='1.0'?>\n<methodResponse>\n<params>\n<param>\n\
                    <value><array><data>\n<value><string>OK</string></value>\n</data></array></value>\n\
                    </param>\n</params>\n</methodResponse>\n";
        let response = MethodResponse::decode(body.as_bytes()).unwrap();
        assert_eq!(
            response,
            MethodResponse::Success(Value::Array(vec![Value::from("OK")]))
        );
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        // Any string parameter survives escaping, including markup and control characters.
        #[test]
        fn test_string_param_survives_codec(payload in any::<String>()) {
            let call = MethodCall::new("unpack_data", vec![Value::from(payload.clone())]);
            let decoded = MethodCall::decode(&call.encode()).unwrap();
            prop_assert_eq!(decoded.params, vec![Value::String(payload)]);
        }
    }
}
