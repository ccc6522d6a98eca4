/// Port-mapped I/O façade (§4.7). The VM never talks to devices directly;
/// `IN`/`OUT` go through this trait, matching the source's
/// `io_read`/`io_write` function-pointer pair but with the `void *user`
/// folded into ordinary closure/struct capture.
pub trait IoHandler {
    /// Returns `Err(())` to raise a bus fault, mirroring a nonzero return
    /// from `io_read` in the source.
    fn read(&mut self, port: u32) -> Result<u32, ()>;
    fn write(&mut self, port: u32, value: u32) -> Result<(), ()>;
}

/// Matches `io_read_default_impl`/`io_write_default_impl`: reads return 0,
/// writes to port 0 echo the low byte to stdout.
#[derive(Default)]
pub struct DefaultIo;

impl IoHandler for DefaultIo {
    fn read(&mut self, _port: u32) -> Result<u32, ()> {
        Ok(0)
    }

    fn write(&mut self, port: u32, value: u32) -> Result<(), ()> {
        if port == 0 {
            print!("{}", value as u8 as char);
        }
        Ok(())
    }
}
