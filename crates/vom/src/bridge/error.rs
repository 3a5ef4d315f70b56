//! Errors crossing process boundaries as `vdl.WireError`.

use thiserror::Error;

use super::Native;
use crate::error::ConversionError;
use crate::model::Any;
use crate::{vdl_enum, vdl_struct};

/// What a caller should do after receiving a [`RemoteError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RetryCode {
    #[default]
    NoRetry,
    RetryConnection,
    RetryRefetch,
    RetryBackoff,
}

vdl_enum!(RetryCode = "vdl.WireRetryCode" { NoRetry, RetryConnection, RetryRefetch, RetryBackoff });

/// An error reported by a peer.
#[derive(Debug, Clone, PartialEq, Default, Error)]
#[error("{id}: {msg}")]
pub struct RemoteError {
    /// Stable identifier of the error kind, e.g. `"v.io/v23/verror.NoExist"`.
    pub id: String,
    pub action: RetryCode,
    pub msg: String,
    /// Formatting parameters, each carrying its own type.
    pub params: Vec<Any>,
}

impl RemoteError {
    pub fn new(id: impl Into<String>, msg: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            msg: msg.into(),
            ..Self::default()
        }
    }

    pub fn with_action(mut self, action: RetryCode) -> Self {
        self.action = action;
        self
    }

    pub fn with_param(mut self, param: Any) -> Self {
        self.params.push(param);
        self
    }
}

/// `vdl.WireError` on the wire.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct WireError {
    pub id: String,
    pub retry_code: RetryCode,
    pub msg: String,
    pub param_list: Vec<Any>,
}

vdl_struct!(WireError = "vdl.WireError" {
    id: String as "Id",
    retry_code: RetryCode as "RetryCode",
    msg: String as "Msg",
    param_list: Vec<Any> as "ParamList",
});

impl Native for RemoteError {
    type Wire = WireError;

    fn to_wire(&self) -> WireError {
        WireError {
            id: self.id.clone(),
            retry_code: self.action,
            msg: self.msg.clone(),
            param_list: self.params.clone(),
        }
    }

    fn from_wire(wire: WireError) -> Result<Self, ConversionError> {
        Ok(Self {
            id: wire.id,
            action: wire.retry_code,
            msg: wire.msg,
            params: wire.param_list,
        })
    }
}
