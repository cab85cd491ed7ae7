//! # destra-rs: serial peek/poke debugger
//!
//! Reads and writes global variables in the RAM of a small 16-bit target
//! over a serial link, addressing them by name.
//!
//! ## Architecture
//!
//! - **Backend**: loads an ELF image, resolves its DWARF debug info into a
//!   type graph, and flattens every global (plus array elements and struct
//!   members) into a name-keyed [`VariableTable`]
//! - **Protocol**: a byte-echo framed peek/poke protocol driven by
//!   [`TransportSession`], with a [`TypeCodec`] turning raw bytes into typed
//!   values
//! - **Config / logging**: `destra.toml` settings and `tracing` output to
//!   the console and `logs/destra.log`
//!
//! ## Example
//!
//! ```ignore
//! use destra_rs::{SymbolResolver, TransportSession, SerialConfig};
//!
//! let table = SymbolResolver::build("firmware.elf")?;
//! let mut session = TransportSession::new(SerialConfig::default());
//! session.connect("/dev/ttyUSB0", 115_200)?;
//!
//! let counter = table.get("counter").unwrap();
//! println!("counter = {}", session.peek_variable(counter)?);
//! ```

pub mod backend;
pub mod config;
pub mod error;
pub mod logging;
pub mod protocol;
pub mod types;

// Re-export commonly used types
pub use backend::{DataDictionary, SymbolResolver, VariableTable};
pub use config::{DestraConfig, LoggingConfig, SerialConfig};
pub use error::{DestraError, Result, ResultExt};
pub use protocol::{PokeValue, SimulatedDevice, TransportSession, TypeCodec, TypeTag, Value};
pub use types::{AddressStatus, Variable};
