//! Type marshaling between Rust values and Python objects
//!
//! Every helper that creates Python objects hands back an owned
//! handle (`Py<T>`) whose reference is released exactly once when it goes out
//! of scope. Conversions that take ownership of a Python object accept it by
//! value so the transfer is visible at the call site.

use pyo3::prelude::*;
use pyo3::types::{PyByteArray, PyBytes, PyDict, PyList, PyString, PyTuple};

use crate::errors::MarshalError;
use crate::types::MultiMap;

/// Build a `dict[str, list[str]]` from a multi-map.
///
/// An empty map yields an empty dict, never `None`, so the handler always
/// receives something it can index.
pub fn map_to_dict(py: Python<'_>, map: &MultiMap) -> PyResult<Py<PyDict>> {
    let dict = PyDict::new(py);
    for (key, values) in map {
        let list = PyList::new(py, values.iter().map(String::as_str));
        dict.set_item(key.as_str(), list)?;
    }
    Ok(dict.into())
}

/// Convert a `dict[str, list[str]]` into a multi-map, consuming the dict.
///
/// Entries whose value is `None` are skipped. Values may be a list or a
/// tuple; a bare `str` is rejected rather than split into characters.
pub fn dict_into_map(py: Python<'_>, dict: Py<PyDict>) -> Result<MultiMap, MarshalError> {
    let dict = dict.into_ref(py);
    let mut map = MultiMap::with_capacity(dict.len());

    for (key, value) in dict.iter() {
        let key = key
            .downcast::<PyString>()
            .map_err(|_| MarshalError::InvalidKey {
                found: type_name(key),
            })?
            .to_str()?
            .to_owned();

        if value.is_none() {
            continue;
        }

        let items = sequence_items(value).ok_or_else(|| MarshalError::InvalidValues {
            key: key.clone(),
            found: type_name(value),
        })?;

        let mut strings = Vec::with_capacity(items.len());
        for (index, item) in items.into_iter().enumerate() {
            let item = item
                .downcast::<PyString>()
                .map_err(|_| MarshalError::InvalidItem {
                    key: key.clone(),
                    index,
                    found: type_name(item),
                })?;
            strings.push(item.to_str()?.to_owned());
        }
        map.insert(key, strings);
    }

    Ok(map)
}

/// Response body as raw bytes: `bytes`/`bytearray` verbatim, `str` as UTF-8.
pub fn body_bytes(obj: &PyAny) -> Result<Vec<u8>, MarshalError> {
    if let Ok(bytes) = obj.downcast::<PyBytes>() {
        return Ok(bytes.as_bytes().to_vec());
    }
    if let Ok(bytes) = obj.downcast::<PyByteArray>() {
        return Ok(bytes.to_vec());
    }
    if let Ok(text) = obj.downcast::<PyString>() {
        return Ok(text.to_str()?.as_bytes().to_vec());
    }
    Err(MarshalError::InvalidBody {
        found: type_name(obj),
    })
}

/// HTTP status from a Python int
pub fn status_code(obj: &PyAny) -> Result<u16, MarshalError> {
    // bool is an int subclass in Python; a True status is a bug, not a 1
    if obj.is_instance_of::<pyo3::types::PyBool>() {
        return Err(MarshalError::InvalidStatus {
            found: type_name(obj),
        });
    }
    let status: i64 = obj.extract().map_err(|_| MarshalError::InvalidStatus {
        found: type_name(obj),
    })?;
    match u16::try_from(status) {
        Ok(code) if (100..=999).contains(&code) => Ok(code),
        _ => Err(MarshalError::StatusOutOfRange(status)),
    }
}

/// Items of a list or tuple; `None` for anything else
pub(crate) fn sequence_items(obj: &PyAny) -> Option<Vec<&PyAny>> {
    if let Ok(list) = obj.downcast::<PyList>() {
        Some(list.iter().collect())
    } else if let Ok(tuple) = obj.downcast::<PyTuple>() {
        Some(tuple.iter().collect())
    } else {
        None
    }
}

/// Python type name for error messages
pub(crate) fn type_name(obj: &PyAny) -> String {
    obj.get_type()
        .name()
        .map(str::to_owned)
        .unwrap_or_else(|_| "<unknown>".to_string())
}
