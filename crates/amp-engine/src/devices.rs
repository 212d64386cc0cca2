use cpal::traits::{DeviceTrait, HostTrait};

use crate::capture::InputDevice;
use crate::error::CaptureError;

/// Inputs in host enumeration order. cpal identifies devices by name, so
/// the name doubles as the id.
pub fn list_input_devices(host: &cpal::Host) -> Result<Vec<InputDevice>, CaptureError> {
    let default_in = host.default_input_device().and_then(|d| d.name().ok());
    let mut out = Vec::new();
    for dev in host.input_devices()? {
        let name = dev.name().unwrap_or_else(|_| "<unknown>".to_string());
        let is_default = default_in.as_deref() == Some(name.as_str());
        out.push(InputDevice { id: name.clone(), label: name, is_default });
    }
    Ok(out)
}

/// Index into `names` for a device id: exact name, then case-insensitive
/// substring, then numeric index. A name match wins over an index, so `"0"`
/// picks a device whose name contains a zero before device 0. `None` picks
/// `default` when listed, else the first name.
pub fn resolve_input(names: &[String], default: Option<&str>, id: Option<&str>) -> Option<usize> {
    let Some(id) = id else {
        let listed = default.and_then(|d| names.iter().position(|n| n == d));
        return listed.or_else(|| (!names.is_empty()).then_some(0));
    };
    let wanted = id.to_lowercase();
    names
        .iter()
        .position(|name| name == id)
        .or_else(|| names.iter().position(|name| name.to_lowercase().contains(&wanted)))
        .or_else(|| id.parse::<usize>().ok().filter(|&i| i < names.len()))
}

/// Open the input [`resolve_input`] picks. With no id and an unlisted host
/// default, the host default is still used.
pub fn find_input(host: &cpal::Host, id: Option<&str>) -> Result<cpal::Device, CaptureError> {
    let default_dev = host.default_input_device();
    let default_name = default_dev.as_ref().and_then(|d| d.name().ok());
    let mut devices: Vec<cpal::Device> = host.input_devices()?.collect();
    let names: Vec<String> = devices.iter().map(|d| d.name().unwrap_or_default()).collect();

    match resolve_input(&names, default_name.as_deref(), id) {
        Some(i) => Ok(devices.swap_remove(i)),
        None if id.is_none() => default_dev.ok_or(CaptureError::DeviceNotFound),
        None => Err(CaptureError::DeviceNotFound),
    }
}

/// Output device by index among output-capable devices, then by name
/// substring (case-insensitive), then the host default.
pub fn pick_output(host: &cpal::Host, name_substr: Option<&str>, index: Option<usize>) -> Result<cpal::Device, CaptureError> {
    if let Some(idx) = index {
        if let Some(dev) = host.output_devices()?.nth(idx) {
            return Ok(dev);
        }
        // fall through to name/default if index not found
    }

    if let Some(q) = name_substr {
        let qn = q.to_lowercase();
        for dev in host.output_devices()? {
            let name = dev.name().unwrap_or_default();
            if name.to_lowercase().contains(&qn) {
                return Ok(dev);
            }
        }
    }

    host.default_output_device().ok_or(CaptureError::DeviceNotFound)
}

/// Pretty-print for CLI
pub fn print_devices(list: &[InputDevice]) {
    if list.is_empty() {
        println!("(no input devices found)");
        return;
    }
    for (i, d) in list.iter().enumerate() {
        let mark = if d.is_default { "[*] " } else { "    " };
        println!("{mark}{:>2}  {}", i, d.label);
    }
}
