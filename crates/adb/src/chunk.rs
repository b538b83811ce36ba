//! Argument chunking for length-limited shell commands.

/// Breaks a list of arguments into groups whose summed length stays within
/// `size_limit`, the way `xargs` groups arguments to respect the kernel's
/// argument cap. Except that the limit here is about 1k instead of 512k.
///
/// An argument longer than the limit gets a chunk of its own; arguments are
/// never split and their order is preserved.
pub fn chunk_args<I>(args: I, size_limit: usize) -> Vec<Vec<String>>
where
    I: IntoIterator<Item = String>,
{
    let mut chunks = Vec::new();
    let mut chunk: Vec<String> = Vec::new();
    let mut chunk_size = 0usize;
    for arg in args {
        if !chunk.is_empty() && chunk_size + arg.len() > size_limit {
            chunks.push(std::mem::take(&mut chunk));
            chunk_size = 0;
        }
        chunk_size += arg.len();
        chunk.push(arg);
    }
    if !chunk.is_empty() {
        chunks.push(chunk);
    }
    chunks
}
