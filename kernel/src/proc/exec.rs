//! exec: image loading and the argv hand-off.
//!
//! The argv vector is marshalled out of the old address space into the
//! syscall layer's bounded kernel buffer first; only then is the new
//! space installed, the image loaded, and the strings plus pointer
//! vector pushed onto the new stack. Any failure after the new space is
//! installed puts the old one back, so a failed exec leaves the caller
//! able to continue.

use std::sync::Arc;

use otter_syscall::OpenFlags;

use super::{Process, TrapFrame};
use crate::{
    error::KernelError,
    memory::{AddressSpace, CopyStrError, VirtAddr},
    param::ARG_MAX,
    syscall,
    vfs::{self, Vnode},
};

/// Flat executable format: magic, entry point, image length, reserved
/// word; the image itself follows, loaded at address zero.
const IMAGE_MAGIC: [u8; 4] = *b"OTX1";
const IMAGE_HEADER_LEN: usize = 16;

/// Argument strings are packed on 4-byte boundaries.
const ARG_ALIGN: usize = 4;

/// Builds an image file's bytes. The production toolchain writes this
/// format; tests use it to lay down executables.
pub fn build_image(entry: usize, body: &[u8]) -> Vec<u8> {
    let mut image = Vec::with_capacity(IMAGE_HEADER_LEN + body.len());
    image.extend_from_slice(&IMAGE_MAGIC);
    image.extend_from_slice(&u32::try_from(entry).unwrap().to_le_bytes());
    image.extend_from_slice(&u32::try_from(body.len()).unwrap().to_le_bytes());
    image.extend_from_slice(&[0; 4]);
    image.extend_from_slice(body);
    image
}

fn load_image(vnode: &Vnode, aspace: &AddressSpace) -> Result<VirtAddr, KernelError> {
    let mut header = [0; IMAGE_HEADER_LEN];
    let n = vnode.read_at(&mut header, 0)?;
    if n != IMAGE_HEADER_LEN || header[..4] != IMAGE_MAGIC {
        return Err(KernelError::InvalidExecutable);
    }

    let entry = u32::from_le_bytes(header[4..8].try_into().unwrap()) as usize;
    let len = u32::from_le_bytes(header[8..12].try_into().unwrap()) as usize;
    if len > aspace.size() || entry >= aspace.size() {
        return Err(KernelError::InvalidExecutable);
    }

    let mut body = vec![0; len];
    let n = vnode.read_at(&mut body, IMAGE_HEADER_LEN as i64)?;
    if n != len {
        return Err(KernelError::InvalidExecutable);
    }
    aspace.copy_out_bytes(VirtAddr::new(0), &body)?;

    Ok(VirtAddr::new(entry))
}

struct PackedArgs {
    /// Byte offset of each string within the kernel buffer.
    offsets: Vec<usize>,
    /// Bytes of packed, NUL-terminated, aligned strings.
    used: usize,
}

/// Copies the argv strings out of `aspace` into `buf`, NUL-terminated
/// and aligned. The packed strings plus the pointer vector must fit in
/// [`ARG_MAX`].
fn pack_args(
    aspace: &AddressSpace,
    uargv: VirtAddr,
    buf: &mut [u8],
) -> Result<PackedArgs, KernelError> {
    let mut offsets = Vec::new();
    let mut used = 0;

    loop {
        let slot = uargv.byte_add(offsets.len() * size_of::<usize>());
        let ptr = aspace.copy_in_ptr(slot)?;
        if ptr == 0 {
            break;
        }

        let dst = &mut buf[used..];
        let len = aspace
            .copy_in_str(VirtAddr::new(ptr), dst)
            .map_err(|e| match e {
                CopyStrError::BadAddress => KernelError::BadAddress,
                CopyStrError::Overflow => KernelError::ArgumentListTooLarge,
            })?;

        let padded = (len + 1).next_multiple_of(ARG_ALIGN);
        if padded > dst.len() {
            return Err(KernelError::ArgumentListTooLarge);
        }
        dst[len..padded].fill(0);

        offsets.push(used);
        used += padded;
    }

    let vector = (offsets.len() + 1) * size_of::<usize>();
    if used + vector > ARG_MAX {
        return Err(KernelError::ArgumentListTooLarge);
    }

    Ok(PackedArgs { offsets, used })
}

/// Lays the packed strings and the pointer vector out on the new stack.
/// Returns the final stack pointer, which addresses `argv[0]`, and the
/// argument count.
fn push_args(
    aspace: &AddressSpace,
    sp: VirtAddr,
    buf: &[u8],
    packed: &PackedArgs,
) -> Result<(VirtAddr, usize), KernelError> {
    let strings_base = sp
        .addr()
        .checked_sub(packed.used)
        .ok_or(KernelError::ArgumentListTooLarge)?;

    let vector_len = (packed.offsets.len() + 1) * size_of::<usize>();
    let argv_base = strings_base
        .checked_sub(vector_len)
        .ok_or(KernelError::ArgumentListTooLarge)?
        & !(size_of::<usize>() - 1);

    aspace.copy_out_bytes(VirtAddr::new(strings_base), &buf[..packed.used])?;

    let mut vector = Vec::with_capacity(vector_len);
    for off in &packed.offsets {
        vector.extend_from_slice(&(strings_base + off).to_ne_bytes());
    }
    vector.extend_from_slice(&0_usize.to_ne_bytes());
    aspace.copy_out_bytes(VirtAddr::new(argv_base), &vector)?;

    Ok((VirtAddr::new(argv_base), packed.offsets.len()))
}

/// Replaces the calling process's image with the executable at `path`,
/// passing the argv vector found at `uargv` in the old image.
///
/// On success the process's trap frame holds the new entry point, the
/// stack pointer (addressing `argv[0]`), argc and argv. The old address
/// space is destroyed only after the new image is fully staged.
pub fn exec(proc: &Arc<Process>, path: &str, uargv: VirtAddr) -> Result<(), KernelError> {
    let old_as = proc.addrspace().ok_or(KernelError::BadAddress)?;

    // Marshal argv while the old image is still the source of truth.
    let mut arg_buf = syscall::arg_buffer().lock();
    let packed = pack_args(&old_as, uargv, &mut arg_buf)?;

    let vnode = vfs::open(path, OpenFlags::READ_ONLY, proc.cwd().as_ref())?;

    let new_as = Arc::new(AddressSpace::new());
    let old = proc.setas(Some(Arc::clone(&new_as)));
    new_as.activate();

    let staged = load_image(&vnode, &new_as).and_then(|entry| {
        let sp = new_as.define_stack();
        let (sp, argc) = push_args(&new_as, sp, &arg_buf, &packed)?;
        Ok((entry, sp, argc))
    });
    drop(vnode);

    let (entry, sp, argc) = match staged {
        Ok(v) => v,
        Err(e) => {
            // Put the old image back; the caller keeps running.
            proc.setas(old);
            old_as.activate();
            return Err(e);
        }
    };

    // Point of no return: the old image goes away.
    drop(old);

    let name = path.rsplit('/').next().unwrap_or(path);
    proc.set_name(name);
    proc.set_trapframe(TrapFrame {
        pc: entry.addr(),
        sp: sp.addr(),
        a0: argc,
        a1: sp.addr(),
    });

    log::debug!("proc {:?} exec {path}, argc {argc}", proc.pid());
    Ok(())
}
