//! Client Module
//!
//! The synchronous protocol client: one instance owns a transport, the
//! entity catalog and the bounded message buffers.
//!
//! ## Responsibilities
//! - Issue one request and await one response per command
//! - Run the init handshake that negotiates the server version and
//!   populates the catalog
//! - Validate entity handles and sizes before any bytes reach the wire
//! - Repopulate catalog lists after group administration and checksum
//!   recalculation

use std::fmt;

use tracing::{debug, info, warn};

use crate::catalog::{
    Catalog, Curve, CurveHandle, Function, FuncHandle, Group, GroupHandle, Variable, VarHandle,
    CURVE_BLOCK_INFO, CURVE_CSUM_SIZE, MAX_ENTITIES,
};
use crate::error::{FerroError, Result};
use crate::protocol::{
    decode_message, encode_message_into, BinOp, Message, Opcode, MAX_MESSAGE,
};
use crate::transport::{CallbackTransport, Transport};

// =============================================================================
// Server Version
// =============================================================================

/// Protocol version reported by the server during the handshake
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Version {
    /// Major version number
    pub major: u8,

    /// Minor version number
    pub minor: u8,

    /// Revision number
    pub revision: u8,

    text: String,
}

impl Version {
    pub(crate) fn new(major: u8, minor: u8, revision: u8) -> Self {
        Self {
            major,
            minor,
            revision,
            text: format!("{major}.{minor:02}.{revision:03}"),
        }
    }

    /// Version formatted as `M.mm.rrr`
    pub fn as_str(&self) -> &str {
        &self.text
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

// =============================================================================
// Function Execution Outcome
// =============================================================================

/// Outcome of a function execution
///
/// A routine that runs but reports a failure is a successful exchange; the
/// domain error byte is carried here rather than in the client's error
/// type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FuncResult {
    /// Domain error byte reported by the routine; 0 means success
    pub error: u8,

    /// Output bytes; exactly the function's declared output size on
    /// success, empty when the routine reported an error
    pub output: Vec<u8>,
}

impl FuncResult {
    /// Whether the routine completed without a domain error
    pub fn is_ok(&self) -> bool {
        self.error == 0
    }

    fn returned(output: Vec<u8>) -> Self {
        Self { error: 0, output }
    }

    fn fault(error: u8) -> Self {
        Self {
            error,
            output: Vec::new(),
        }
    }
}

// =============================================================================
// Client
// =============================================================================

/// Synchronous protocol client
///
/// Construct with [`Client::new`] or [`Client::from_callbacks`], then call
/// [`Client::init`] before issuing commands. Commands are strictly
/// serialized: each blocks until its response is parsed or a transport
/// error is returned.
pub struct Client<T> {
    transport: T,
    initialized: bool,
    version: Option<Version>,
    catalog: Catalog,
    send_buf: Vec<u8>,
    recv_buf: Vec<u8>,
}

impl<S, R> Client<CallbackTransport<S, R>>
where
    S: FnMut(&[u8]) -> std::io::Result<()>,
    R: FnMut(&mut [u8]) -> std::io::Result<usize>,
{
    /// Create a client from a pair of send/recv callbacks
    pub fn from_callbacks(send_fn: S, recv_fn: R) -> Self {
        Self::new(CallbackTransport::new(send_fn, recv_fn))
    }
}

impl<T: Transport> Client<T> {
    /// Create a client over the given transport
    ///
    /// The catalog starts empty; run [`Client::init`] to populate it.
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            initialized: false,
            version: None,
            catalog: Catalog::new(),
            send_buf: vec![0; MAX_MESSAGE],
            recv_buf: vec![0; MAX_MESSAGE],
        }
    }

    // -------------------------------------------------------------------------
    // Command Engine
    // -------------------------------------------------------------------------

    /// Issue one request and await one response
    fn exchange(&mut self, request: &Message) -> Result<Message> {
        let len = encode_message_into(request, &mut self.send_buf)?;
        self.transport.send(&self.send_buf[..len])?;

        let received = self.transport.recv(&mut self.recv_buf)?;
        if received > self.recv_buf.len() {
            return Err(FerroError::Comm(format!(
                "transport reported a frame of {received} bytes, larger than the {MAX_MESSAGE} byte maximum"
            )));
        }

        let response = decode_message(&self.recv_buf[..received])?;
        debug!(
            request = ?request.opcode,
            request_len = request.payload.len(),
            response = ?response.opcode,
            response_len = response.payload.len(),
            "exchanged frames"
        );
        Ok(response)
    }

    /// Exchange and require a specific response opcode
    fn command(&mut self, request: &Message, expected: Opcode) -> Result<Vec<u8>> {
        let response = self.exchange(request)?;
        if response.opcode != expected {
            return Err(FerroError::Comm(format!(
                "unexpected response {:?} to {:?} (expected {:?})",
                response.opcode, request.opcode, expected
            )));
        }
        Ok(response.payload)
    }

    // -------------------------------------------------------------------------
    // Init Handshake
    // -------------------------------------------------------------------------

    /// Query the server version and populate the entity catalog
    ///
    /// Stops at the first failure. A failure while the group members are
    /// being queried clears the groups list entirely; the other lists are
    /// replaced atomically.
    pub fn init(&mut self) -> Result<()> {
        let version = self.fetch_version()?;
        self.version = Some(version);

        self.update_vars()?;
        self.update_groups()?;
        self.update_curves()?;
        self.update_funcs()?;

        self.initialized = true;
        info!(
            version = %self.version.as_ref().map(Version::as_str).unwrap_or_default(),
            vars = self.catalog.vars.items().len(),
            groups = self.catalog.groups.items().len(),
            curves = self.catalog.curves.items().len(),
            funcs = self.catalog.funcs.items().len(),
            "client initialized"
        );
        Ok(())
    }

    fn fetch_version(&mut self) -> Result<Version> {
        let response = self.exchange(&Message::empty(Opcode::QueryVersion))?;

        // Servers predating the version query answer with an
        // operation-not-supported report, which pins them to 1.0.0.
        if response.opcode == Opcode::ErrOpNotSupported {
            return Ok(Version::new(1, 0, 0));
        }

        let payload = &response.payload;
        if payload.len() < 3 {
            return Err(FerroError::Comm(format!(
                "version response carries {} bytes, expected at least 3",
                payload.len()
            )));
        }
        Ok(Version::new(payload[0], payload[1], payload[2]))
    }

    fn update_vars(&mut self) -> Result<()> {
        let payload = self.command(&Message::empty(Opcode::VarQueryList), Opcode::VarList)?;
        if payload.len() > MAX_ENTITIES {
            return Err(FerroError::Comm(format!(
                "variable list reports {} entries, more than the {MAX_ENTITIES} addressable",
                payload.len()
            )));
        }

        let vars = payload
            .iter()
            .enumerate()
            .map(|(id, &raw)| Variable::from_descriptor(id as u8, raw))
            .collect();
        self.catalog.vars.replace(vars);
        Ok(())
    }

    fn update_groups(&mut self) -> Result<()> {
        let descriptors =
            self.command(&Message::empty(Opcode::GroupQueryList), Opcode::GroupList)?;

        match self.populate_groups(&descriptors) {
            Ok(groups) => {
                self.catalog.groups.replace(groups);
                Ok(())
            }
            Err(err) => {
                // A half-queried list is useless; drop it wholesale so no
                // partially filled group survives.
                self.catalog.groups.clear();
                Err(err)
            }
        }
    }

    fn populate_groups(&mut self, descriptors: &[u8]) -> Result<Vec<Group>> {
        if descriptors.len() > MAX_ENTITIES {
            return Err(FerroError::Comm(format!(
                "group list reports {} entries, more than the {MAX_ENTITIES} addressable",
                descriptors.len()
            )));
        }

        let mut groups = Vec::with_capacity(descriptors.len());
        for (id, &raw) in descriptors.iter().enumerate() {
            let id = id as u8;
            let (writable, expected_members) = Group::from_descriptor(raw);

            let member_ids =
                self.command(&Message::new(Opcode::GroupQuery, vec![id]), Opcode::Group)?;
            if member_ids.len() != expected_members {
                return Err(FerroError::Comm(format!(
                    "group {id} lists {} members but its descriptor declares {expected_members}",
                    member_ids.len()
                )));
            }

            let mut members = Vec::with_capacity(member_ids.len());
            let mut size = 0;
            for &var_id in &member_ids {
                let handle = self
                    .catalog
                    .vars
                    .handle_of(usize::from(var_id))
                    .ok_or_else(|| {
                        FerroError::Comm(format!(
                            "group {id} references unknown variable {var_id}"
                        ))
                    })?;
                size += self.catalog.vars.resolve(handle)?.size;
                members.push(handle);
            }

            groups.push(Group {
                id,
                writable,
                size,
                members,
            });
        }

        Ok(groups)
    }

    fn update_curves(&mut self) -> Result<()> {
        let payload = self.command(&Message::empty(Opcode::CurveQueryList), Opcode::CurveList)?;
        let mut curves = Curve::parse_list(&payload)?;

        for curve in &mut curves {
            let request = Message::new(Opcode::CurveQueryCsum, vec![curve.id]);
            match self.command(&request, Opcode::CurveCsum) {
                Ok(csum) if csum.len() == CURVE_CSUM_SIZE => {
                    curve.checksum.copy_from_slice(&csum);
                }
                Ok(csum) => {
                    warn!(
                        curve = curve.id,
                        len = csum.len(),
                        "checksum response has wrong length, leaving checksum zeroed"
                    );
                }
                Err(err) => {
                    warn!(
                        curve = curve.id,
                        error = %err,
                        "checksum fetch failed, leaving checksum zeroed"
                    );
                }
            }
        }

        self.catalog.curves.replace(curves);
        Ok(())
    }

    fn update_funcs(&mut self) -> Result<()> {
        let payload = self.command(&Message::empty(Opcode::FuncQueryList), Opcode::FuncList)?;
        if payload.len() > MAX_ENTITIES {
            return Err(FerroError::Comm(format!(
                "function list reports {} entries, more than the {MAX_ENTITIES} addressable",
                payload.len()
            )));
        }

        let funcs = payload
            .iter()
            .enumerate()
            .map(|(id, &raw)| Function::from_descriptor(id as u8, raw))
            .collect();
        self.catalog.funcs.replace(funcs);
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Accessors
    // -------------------------------------------------------------------------

    /// Whether the init handshake has completed successfully
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Server version, available once the handshake has queried it
    pub fn version(&self) -> Option<&Version> {
        self.version.as_ref()
    }

    /// Variables discovered at init
    pub fn vars(&self) -> &[Variable] {
        self.catalog.vars.items()
    }

    /// Groups discovered at init or after the last group administration
    pub fn groups(&self) -> &[Group] {
        self.catalog.groups.items()
    }

    /// Curves discovered at init or after the last checksum recalculation
    pub fn curves(&self) -> &[Curve] {
        self.catalog.curves.items()
    }

    /// Functions discovered at init
    pub fn funcs(&self) -> &[Function] {
        self.catalog.funcs.items()
    }

    /// Mint a live handle for the variable with the given id
    pub fn var_handle(&self, id: u8) -> Option<VarHandle> {
        self.catalog.vars.handle_of(usize::from(id))
    }

    /// Mint a live handle for the group with the given id
    pub fn group_handle(&self, id: u8) -> Option<GroupHandle> {
        self.catalog.groups.handle_of(usize::from(id))
    }

    /// Mint a live handle for the curve with the given id
    pub fn curve_handle(&self, id: u8) -> Option<CurveHandle> {
        self.catalog.curves.handle_of(usize::from(id))
    }

    /// Mint a live handle for the function with the given id
    pub fn func_handle(&self, id: u8) -> Option<FuncHandle> {
        self.catalog.funcs.handle_of(usize::from(id))
    }

    /// Look up a variable by handle, if it is still live
    pub fn variable(&self, handle: VarHandle) -> Option<&Variable> {
        self.catalog.vars.resolve(handle).ok()
    }

    /// Look up a group by handle, if it is still live
    pub fn group(&self, handle: GroupHandle) -> Option<&Group> {
        self.catalog.groups.resolve(handle).ok()
    }

    /// Look up a curve by handle, if it is still live
    pub fn curve(&self, handle: CurveHandle) -> Option<&Curve> {
        self.catalog.curves.resolve(handle).ok()
    }

    /// Look up a function by handle, if it is still live
    pub fn function(&self, handle: FuncHandle) -> Option<&Function> {
        self.catalog.funcs.resolve(handle).ok()
    }

    // -------------------------------------------------------------------------
    // Variable Commands
    // -------------------------------------------------------------------------

    /// Read a variable's value
    pub fn read_var(&mut self, var: VarHandle) -> Result<Vec<u8>> {
        let (id, size) = {
            let var = self.catalog.vars.resolve(var)?;
            (var.id, var.size)
        };

        let payload = self.command(&Message::new(Opcode::VarRead, vec![id]), Opcode::VarValue)?;
        if payload.len() != size {
            return Err(FerroError::Comm(format!(
                "variable {id} value carries {} bytes, expected {size}",
                payload.len()
            )));
        }
        Ok(payload)
    }

    /// Write a variable's value
    ///
    /// `value` must be exactly the variable's declared size.
    pub fn write_var(&mut self, var: VarHandle, value: &[u8]) -> Result<()> {
        let (id, size) = {
            let var = self.catalog.vars.resolve(var)?;
            if !var.writable {
                return Err(FerroError::ParamInvalid(format!(
                    "variable {} is read-only",
                    var.id
                )));
            }
            (var.id, var.size)
        };
        if value.len() != size {
            return Err(FerroError::ParamInvalid(format!(
                "value of {} bytes does not match variable {id} size {size}",
                value.len()
            )));
        }

        let mut payload = Vec::with_capacity(1 + value.len());
        payload.push(id);
        payload.extend_from_slice(value);
        self.command(&Message::new(Opcode::VarWrite, payload), Opcode::Ok)?;
        Ok(())
    }

    /// Write one variable and read another in a single exchange
    pub fn write_read_vars(
        &mut self,
        write_var: VarHandle,
        write_value: &[u8],
        read_var: VarHandle,
    ) -> Result<Vec<u8>> {
        let (write_id, write_size) = {
            let var = self.catalog.vars.resolve(write_var)?;
            if !var.writable {
                return Err(FerroError::ParamInvalid(format!(
                    "variable {} is read-only",
                    var.id
                )));
            }
            (var.id, var.size)
        };
        let (read_id, read_size) = {
            let var = self.catalog.vars.resolve(read_var)?;
            (var.id, var.size)
        };
        if write_value.len() != write_size {
            return Err(FerroError::ParamInvalid(format!(
                "value of {} bytes does not match variable {write_id} size {write_size}",
                write_value.len()
            )));
        }

        let mut payload = Vec::with_capacity(2 + write_value.len());
        payload.push(write_id);
        payload.push(read_id);
        payload.extend_from_slice(write_value);

        let response =
            self.command(&Message::new(Opcode::VarWriteRead, payload), Opcode::VarValue)?;
        if response.len() != read_size {
            return Err(FerroError::Comm(format!(
                "variable {read_id} value carries {} bytes, expected {read_size}",
                response.len()
            )));
        }
        Ok(response)
    }

    /// Apply a binary operation to a variable through a mask
    pub fn bin_op_var(&mut self, op: BinOp, var: VarHandle, mask: &[u8]) -> Result<()> {
        let (id, size) = {
            let var = self.catalog.vars.resolve(var)?;
            if !var.writable {
                return Err(FerroError::ParamInvalid(format!(
                    "variable {} is read-only",
                    var.id
                )));
            }
            (var.id, var.size)
        };
        if mask.len() != size {
            return Err(FerroError::ParamInvalid(format!(
                "mask of {} bytes does not match variable {id} size {size}",
                mask.len()
            )));
        }

        let mut payload = Vec::with_capacity(2 + mask.len());
        payload.push(id);
        payload.push(op.code());
        payload.extend_from_slice(mask);
        self.command(&Message::new(Opcode::VarBinOp, payload), Opcode::Ok)?;
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Group Commands
    // -------------------------------------------------------------------------

    /// Read the concatenated values of a group's members
    pub fn read_group(&mut self, group: GroupHandle) -> Result<Vec<u8>> {
        let (id, size) = {
            let group = self.catalog.groups.resolve(group)?;
            (group.id, group.size)
        };

        let payload =
            self.command(&Message::new(Opcode::GroupRead, vec![id]), Opcode::GroupValues)?;
        if payload.len() != size {
            return Err(FerroError::Comm(format!(
                "group {id} values carry {} bytes, expected {size}",
                payload.len()
            )));
        }
        Ok(payload)
    }

    /// Write the concatenated values of a group's members
    pub fn write_group(&mut self, group: GroupHandle, values: &[u8]) -> Result<()> {
        let (id, size) = {
            let group = self.catalog.groups.resolve(group)?;
            if !group.writable {
                return Err(FerroError::ParamInvalid(format!(
                    "group {} is read-only",
                    group.id
                )));
            }
            (group.id, group.size)
        };
        if values.len() != size {
            return Err(FerroError::ParamInvalid(format!(
                "values of {} bytes do not match group {id} size {size}",
                values.len()
            )));
        }

        let mut payload = Vec::with_capacity(1 + values.len());
        payload.push(id);
        payload.extend_from_slice(values);
        self.command(&Message::new(Opcode::GroupWrite, payload), Opcode::Ok)?;
        Ok(())
    }

    /// Apply a binary operation to every member of a group through a mask
    pub fn bin_op_group(&mut self, op: BinOp, group: GroupHandle, mask: &[u8]) -> Result<()> {
        let (id, size) = {
            let group = self.catalog.groups.resolve(group)?;
            if !group.writable {
                return Err(FerroError::ParamInvalid(format!(
                    "group {} is read-only",
                    group.id
                )));
            }
            (group.id, group.size)
        };
        if mask.len() != size {
            return Err(FerroError::ParamInvalid(format!(
                "mask of {} bytes does not match group {id} size {size}",
                mask.len()
            )));
        }

        let mut payload = Vec::with_capacity(2 + mask.len());
        payload.push(id);
        payload.push(op.code());
        payload.extend_from_slice(mask);
        self.command(&Message::new(Opcode::GroupBinOp, payload), Opcode::Ok)?;
        Ok(())
    }

    /// Create a group from the given variables, then refresh the groups list
    pub fn create_group(&mut self, members: &[VarHandle]) -> Result<()> {
        if members.is_empty() {
            return Err(FerroError::ParamInvalid(
                "group creation requires at least one variable".to_string(),
            ));
        }

        let mut payload = Vec::with_capacity(members.len());
        for &member in members {
            payload.push(self.catalog.vars.resolve(member)?.id);
        }

        self.command(&Message::new(Opcode::GroupCreate, payload), Opcode::Ok)?;
        self.update_groups()
    }

    /// Remove every server group, then refresh the groups list
    ///
    /// The first three groups are server-reserved and survive.
    pub fn remove_all_groups(&mut self) -> Result<()> {
        self.command(&Message::empty(Opcode::GroupRemoveAll), Opcode::Ok)?;
        self.update_groups()
    }

    // -------------------------------------------------------------------------
    // Curve Commands
    // -------------------------------------------------------------------------

    /// Request one block of a curve
    ///
    /// Returns the block bytes; the server may send fewer than
    /// `block_size` bytes for the final block.
    pub fn request_curve_block(&mut self, curve: CurveHandle, offset: u16) -> Result<Vec<u8>> {
        let (id, nblocks) = {
            let curve = self.catalog.curves.resolve(curve)?;
            (curve.id, curve.nblocks)
        };
        if u32::from(offset) > nblocks {
            return Err(FerroError::ParamOutOfRange(format!(
                "block offset {offset} past curve {id} block count {nblocks}"
            )));
        }

        let offset_bytes = offset.to_be_bytes();
        let request = Message::new(
            Opcode::CurveBlockRequest,
            vec![id, offset_bytes[0], offset_bytes[1]],
        );
        let payload = self.command(&request, Opcode::CurveBlock)?;
        if payload.len() < CURVE_BLOCK_INFO {
            return Err(FerroError::Comm(format!(
                "curve block response carries {} bytes, shorter than its {CURVE_BLOCK_INFO} byte header",
                payload.len()
            )));
        }
        Ok(payload[CURVE_BLOCK_INFO..].to_vec())
    }

    /// Send one block of a curve
    pub fn send_curve_block(&mut self, curve: CurveHandle, offset: u16, data: &[u8]) -> Result<()> {
        let (id, nblocks, block_size) = {
            let curve = self.catalog.curves.resolve(curve)?;
            if !curve.writable {
                return Err(FerroError::ParamInvalid(format!(
                    "curve {} is read-only",
                    curve.id
                )));
            }
            (curve.id, curve.nblocks, usize::from(curve.block_size))
        };
        if u32::from(offset) > nblocks {
            return Err(FerroError::ParamOutOfRange(format!(
                "block offset {offset} past curve {id} block count {nblocks}"
            )));
        }
        if data.len() > block_size {
            return Err(FerroError::ParamOutOfRange(format!(
                "block of {} bytes exceeds curve {id} block size {block_size}",
                data.len()
            )));
        }

        let offset_bytes = offset.to_be_bytes();
        let mut payload = Vec::with_capacity(CURVE_BLOCK_INFO + data.len());
        payload.push(id);
        payload.extend_from_slice(&offset_bytes);
        payload.extend_from_slice(data);
        self.command(&Message::new(Opcode::CurveBlock, payload), Opcode::Ok)?;
        Ok(())
    }

    /// Ask the server to recompute a curve's checksum, then refresh the
    /// curves list
    pub fn recalc_checksum(&mut self, curve: CurveHandle) -> Result<()> {
        let id = self.catalog.curves.resolve(curve)?.id;

        self.command(&Message::new(Opcode::CurveRecalcCsum, vec![id]), Opcode::Ok)?;
        self.update_curves()
    }

    // -------------------------------------------------------------------------
    // Function Commands
    // -------------------------------------------------------------------------

    /// Execute a server function
    ///
    /// `input` must be exactly the function's declared input size. A
    /// domain error reported by the routine is a successful call with the
    /// [`FuncResult::error`] byte set.
    pub fn execute_func(&mut self, func: FuncHandle, input: &[u8]) -> Result<FuncResult> {
        let (id, input_size, output_size) = {
            let func = self.catalog.funcs.resolve(func)?;
            (func.id, func.input_size, func.output_size)
        };
        if input.len() != input_size {
            return Err(FerroError::ParamInvalid(format!(
                "input of {} bytes does not match function {id} input size {input_size}",
                input.len()
            )));
        }

        let mut payload = Vec::with_capacity(1 + input.len());
        payload.push(id);
        payload.extend_from_slice(input);

        let response = self.exchange(&Message::new(Opcode::FuncExecute, payload))?;
        match response.opcode {
            Opcode::FuncReturn => {
                if response.payload.len() != output_size {
                    return Err(FerroError::Comm(format!(
                        "function {id} returned {} bytes, expected {output_size}",
                        response.payload.len()
                    )));
                }
                Ok(FuncResult::returned(response.payload))
            }
            Opcode::FuncError => {
                let error = *response.payload.first().ok_or_else(|| {
                    FerroError::Comm(format!("function {id} error report carries no error byte"))
                })?;
                Ok(FuncResult::fault(error))
            }
            other => Err(FerroError::Comm(format!(
                "unexpected response {other:?} to function execution"
            ))),
        }
    }
}
