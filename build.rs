// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

// 构建脚本: 静态链接的 FFmpeg (摄像头采集) 需要的系统库
fn main() {
    // 仅在Windows MSVC环境下需要
    #[cfg(all(target_os = "windows", target_env = "msvc"))]
    {
        // vcpkg 版 FFmpeg 依赖的编解码库
        println!("cargo:rustc-link-lib=dylib=libmfx");
        println!("cargo:rustc-link-lib=dylib=libx264");

        // dshow 摄像头输入依赖 OLE 自动化和VFW
        println!("cargo:rustc-link-lib=dylib=oleaut32");
        println!("cargo:rustc-link-lib=dylib=vfw32");

        println!("cargo:rustc-link-lib=dylib=secur32");
    }
}
