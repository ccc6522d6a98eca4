//! Print displays for the runner.
use colored::Colorize;
use fox32_core::Vm;

pub fn print_startup_banner(rom_path: &str) {
    println!("\n{}", "╔═════════════════════════════════════════════╗".bright_cyan());
    println!(
        "{} {}  {}",
        "║".bright_cyan(),
        " FOX32 VIRTUAL MACHINE ".bold(),
        "║".bright_cyan()
    );
    println!("{} rom: {}", "║".bright_cyan(), rom_path.yellow());
    println!("{}", "╚═════════════════════════════════════════════╝".bright_cyan());
    println!();
}

pub fn print_state(vm: &Vm) {
    let flags = vm.flags();
    println!("\n{}", "VM STATE".bold());
    println!("-------------------------");
    println!("ip:     {:#010x}", vm.pointer_instr());
    println!("sp:     {:#010x}", vm.registers().sp);
    println!(
        "flags:  zero={} carry={} ie={} swap_sp={}",
        flags.zero, flags.carry, flags.interrupt_enable, flags.swap_sp
    );
    for (i, chunk) in vm.registers().general.chunks(4).enumerate() {
        let values: Vec<String> = chunk
            .iter()
            .enumerate()
            .map(|(j, v)| format!("r{:<2}={:#010x}", i * 4 + j, v))
            .collect();
        println!("{}", values.join("  "));
    }
    println!("-------------------------\n");
}
