use std::env;
use std::io::{self, Write};
use std::process;

use ufs::emulator::ImageDisk;

fn usage() -> ! {
    eprintln!("usage: ufsls <image> ls <dir>");
    eprintln!("       ufsls <image> cat <file>");
    process::exit(2);
}

fn run(image: &str, cmd: &str, path: &str) -> ufs::Result<()> {
    let mut disk = ImageDisk::open(image)?;
    match cmd {
        "ls" => ufs::dir(&mut disk, path, |name, is_dir| {
            println!("{}{}", name, if is_dir { "/" } else { "" });
            false
        }),
        "cat" => {
            let mut file = ufs::open(&mut disk, path)?;
            let stdout = io::stdout();
            let mut out = stdout.lock();
            let mut buf = vec![0; 64 * 1024];
            loop {
                let read = file.read(&mut buf)?;
                if read == 0 {
                    break;
                }
                out.write_all(&buf[..read])?;
            }
            file.close();
            Ok(())
        }
        _ => usage(),
    }
}

pub fn main() {
    let args: Vec<String> = env::args().collect();
    if args.len() != 4 {
        usage();
    }
    if let Err(err) = run(&args[1], &args[2], &args[3]) {
        eprintln!("ufsls: {}: {}", args[3], err);
        process::exit(1);
    }
}
